mod loss_fn;
mod mse;
mod sigmoid_cross_entropy;
mod softmax_cross_entropy;

use api::{LossType, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};

pub use loss_fn::LossFn;
pub use mse::Mse;
pub use sigmoid_cross_entropy::SigmoidCrossEntropy;
pub use softmax_cross_entropy::SoftmaxCrossEntropy;

/// The loss a workload is scored with.
#[derive(Debug, Clone, Copy)]
pub enum Loss {
    SoftmaxCrossEntropy(SoftmaxCrossEntropy),
    SigmoidCrossEntropy(SigmoidCrossEntropy),
    Mse(Mse),
}

impl From<LossType> for Loss {
    fn from(value: LossType) -> Self {
        match value {
            LossType::SoftmaxCrossEntropy => Self::SoftmaxCrossEntropy(SoftmaxCrossEntropy),
            LossType::SigmoidCrossEntropy => Self::SigmoidCrossEntropy(SigmoidCrossEntropy),
            LossType::MeanSquaredError => Self::Mse(Mse::new()),
        }
    }
}

impl LossFn for Loss {
    fn loss(&self, logits: ArrayView2<f32>, labels: ArrayView1<u32>) -> Result<f32> {
        match self {
            Self::SoftmaxCrossEntropy(l) => l.loss(logits, labels),
            Self::SigmoidCrossEntropy(l) => l.loss(logits, labels),
            Self::Mse(l) => l.loss(logits, labels),
        }
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, labels: ArrayView1<u32>) -> Result<Array2<f32>> {
        match self {
            Self::SoftmaxCrossEntropy(l) => l.loss_prime(logits, labels),
            Self::SigmoidCrossEntropy(l) => l.loss_prime(logits, labels),
            Self::Mse(l) => l.loss_prime(logits, labels),
        }
    }
}

#[cfg(test)]
mod tests {
    use api::BenchErr;
    use ndarray::{arr1, arr2};

    use super::*;

    /// Checks `loss_prime` against central finite differences of `loss`.
    fn check_gradient(loss: Loss) {
        let logits = arr2(&[[0.3, -1.2, 2.0], [1.5, 0.1, -0.4]]);
        let labels = arr1(&[2, 0]);
        let grad = loss.loss_prime(logits.view(), labels.view()).unwrap();
        let h = 1e-2;

        for ((i, j), &g) in grad.indexed_iter() {
            let mut plus = logits.clone();
            let mut minus = logits.clone();
            plus[[i, j]] += h;
            minus[[i, j]] -= h;

            let numeric = (loss.loss(plus.view(), labels.view()).unwrap()
                - loss.loss(minus.view(), labels.view()).unwrap())
                / (2. * h);
            assert!((numeric - g).abs() < 1e-3, "{loss:?} at {i},{j}: {numeric} vs {g}");
        }
    }

    #[test]
    fn softmax_cross_entropy_of_uniform_logits_is_log_classes() {
        let logits = Array2::zeros((4, 10));
        let labels = arr1(&[0, 3, 9, 5]);
        let loss = SoftmaxCrossEntropy.loss(logits.view(), labels.view()).unwrap();
        assert!((loss - 10f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn softmax_cross_entropy_is_stable_for_large_logits() {
        let logits = arr2(&[[1000., 0.], [0., 1000.]]);
        let labels = arr1(&[0, 0]);
        let loss = SoftmaxCrossEntropy.loss(logits.view(), labels.view()).unwrap();
        assert!((loss - 500.).abs() < 1e-3);
    }

    #[test]
    fn gradients_match_finite_differences() {
        check_gradient(LossType::SoftmaxCrossEntropy.into());
        check_gradient(LossType::SigmoidCrossEntropy.into());
        check_gradient(LossType::MeanSquaredError.into());
    }

    #[test]
    fn labels_past_the_last_class_are_rejected() {
        let logits = Array2::zeros((2, 3));
        let labels = arr1(&[1, 3]);

        for loss in [
            Loss::from(LossType::SoftmaxCrossEntropy),
            Loss::from(LossType::SigmoidCrossEntropy),
            Loss::from(LossType::MeanSquaredError),
        ] {
            assert!(matches!(
                loss.loss(logits.view(), labels.view()),
                Err(BenchErr::LabelOutOfRange { label: 3, classes: 3 })
            ));
            assert!(matches!(
                loss.loss_prime(logits.view(), labels.view()),
                Err(BenchErr::LabelOutOfRange { label: 3, classes: 3 })
            ));
        }
    }
}
