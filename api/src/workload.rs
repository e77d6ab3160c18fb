use std::{path::Path, time::Duration};

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{
    AuxState, Batch, Params, RandomState, ReplicaPool, Result,
    config::{ForwardPassMode, LossType, ParameterTypeTree, Split},
    reduce::{Mean, fold_mean},
    tree::{ShapeTree, TensorTree},
};

/// The evaluation batch size every workload reads its evaluation split with.
pub const EVAL_BATCH_SIZE: usize = 200;

/// The outcome of evaluating a model on the evaluation split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub loss: f32,
    /// Fraction of correctly classified examples, in `[0, 1]`.
    pub accuracy: f32,
    pub num_batches: usize,
    pub num_examples: usize,
}

/// The metrics a single replica computes on its shard of an evaluation batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchMetrics {
    pub loss: f32,
    pub accuracy: f32,
}

impl Mean for BatchMetrics {
    fn mean_of(values: &[Self]) -> Result<Self> {
        let mut mean = values[0];
        for (k, m) in values.iter().enumerate().skip(1) {
            fold_mean(&mut mean.loss, m.loss, k);
            fold_mean(&mut mean.accuracy, m.accuracy, k);
        }

        Ok(mean)
    }
}

/// What a training-mode forward pass followed by its vector-Jacobian product produces.
#[derive(Debug, Clone)]
pub struct VjpOutput {
    pub logits: Array2<f32>,
    /// The auxiliary state updated with the statistics of this batch.
    pub aux: TensorTree,
    /// The gradient of the pulled back cotangent with respect to every parameter leaf.
    pub grads: TensorTree,
}

/// The properties of a workload that are fixed before any model exists.
pub trait WorkloadProperties {
    fn name(&self) -> &str;

    /// The evaluation accuracy a submission has to exceed.
    fn target_value(&self) -> f32;

    fn loss_type(&self) -> LossType;

    /// Per-channel mean of the training inputs.
    fn train_mean(&self) -> [f32; 3];

    /// Per-channel standard deviation of the training inputs.
    fn train_stddev(&self) -> [f32; 3];

    fn num_train_examples(&self) -> usize;

    fn num_eval_examples(&self) -> usize;

    fn num_classes(&self) -> usize;

    fn eval_batch_size(&self) -> usize {
        EVAL_BATCH_SIZE
    }

    fn max_allowed_runtime(&self) -> Duration;

    /// The wall-clock time between two evaluations.
    fn eval_period(&self) -> Duration;

    /// Whether `summary` meets the target, the comparison is strict.
    fn has_reached_goal(&self, summary: &EvalSummary) -> bool {
        summary.accuracy > self.target_value()
    }
}

/// A workload that still has no model.
///
/// Initializing the model consumes the value and hands back the workload in its ready phase,
/// the only phase where the parameter shapes can be read.
pub trait InitModel: WorkloadProperties + Sized {
    type Ready: Workload;

    /// Builds the model and its initial state.
    ///
    /// # Arguments
    /// * `rng` - The stream used to initialize the parameters.
    ///
    /// # Returns
    /// The ready workload along with the parameters and auxiliary state replicated once per
    /// replica.
    fn init_model_fn(self, rng: RandomState) -> Result<(Self::Ready, Params, AuxState)>;
}

/// A learning task with a fixed model, data pipeline and evaluation protocol.
pub trait Workload: WorkloadProperties + Sync {
    /// The stream of training or evaluation batches.
    ///
    /// Training queues never end, an evaluation queue ends after one pass over its split.
    type Queue: Iterator<Item = Result<Batch>> + Send;

    /// The replicas every parallel step of this workload runs on.
    fn pool(&self) -> &ReplicaPool;

    /// The shapes recorded when the model was initialized.
    fn param_shapes(&self) -> &ShapeTree;

    fn model_params_types(&self) -> ParameterTypeTree;

    /// Whether the parameter leaf under `path` belongs to the output layer.
    fn is_output_params(&self, path: &str) -> bool;

    /// Builds the input queue of a split.
    ///
    /// # Arguments
    /// * `rng` - The stream the queue shuffles with.
    /// * `split` - The split to read.
    /// * `data_dir` - Where the dataset lives.
    /// * `batch_size` - The global batch size, must be divisible by the amount of replicas.
    ///
    /// # Returns
    /// An infinite queue of normalized batches.
    fn build_input_queue(
        &self,
        rng: RandomState,
        split: Split,
        data_dir: &Path,
        batch_size: usize,
    ) -> Result<Self::Queue>;

    /// Runs the model forward.
    ///
    /// # Arguments
    /// * `params` - The parameters of one replica.
    /// * `inputs` - The examples, one per row.
    /// * `aux` - The auxiliary state of the same replica.
    /// * `mode` - Whether to run in train or eval mode.
    /// * `rng` - The stream for stochastic layers.
    /// * `update_aux_state` - Whether to return an updated auxiliary state, train mode only.
    ///
    /// # Returns
    /// The logits and, if requested, the updated auxiliary state.
    fn model_fn(
        &self,
        params: &TensorTree,
        inputs: ArrayView2<f32>,
        aux: &TensorTree,
        mode: ForwardPassMode,
        rng: RandomState,
        update_aux_state: bool,
    ) -> Result<(Array2<f32>, Option<TensorTree>)>;

    /// Runs the model forward in train mode and pulls a cotangent back to the parameters.
    ///
    /// # Arguments
    /// * `params` - The parameters of one replica.
    /// * `inputs` - The examples, one per row.
    /// * `aux` - The auxiliary state of the same replica.
    /// * `rng` - The stream for stochastic layers.
    /// * `cotangent` - Maps the logits to the gradient of the loss with respect to them.
    fn model_vjp(
        &self,
        params: &TensorTree,
        inputs: ArrayView2<f32>,
        aux: &TensorTree,
        rng: RandomState,
        cotangent: &(dyn Fn(ArrayView2<f32>) -> Result<Array2<f32>> + Sync),
    ) -> Result<VjpOutput>;

    /// The mean loss of a batch, without any regularization term.
    ///
    /// # Returns
    /// The loss, or a `LabelOutOfRange` error if a label doesn't index a column of `logits`.
    fn loss_fn(&self, labels: ArrayView1<u32>, logits: ArrayView2<f32>) -> Result<f32>;

    /// The gradient of [`Workload::loss_fn`] with respect to the logits.
    fn loss_grad(&self, labels: ArrayView1<u32>, logits: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Turns logits into predictions for the given loss type.
    fn output_activation_fn(&self, logits: ArrayView2<f32>, loss_type: LossType) -> Array2<f32>;

    /// Averages the auxiliary state across replicas.
    fn sync_batch_stats(&self, aux: &AuxState) -> Result<AuxState>;

    /// Evaluates the model on the evaluation split.
    ///
    /// # Arguments
    /// * `params` - The replicated parameters.
    /// * `aux` - The replicated auxiliary state, synchronized before it's read.
    /// * `rng` - The stream split between the data pipeline and the model.
    /// * `data_dir` - Where the dataset lives.
    fn eval_model(
        &self,
        params: &Params,
        aux: &AuxState,
        rng: RandomState,
        data_dir: &Path,
    ) -> Result<EvalSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::pmean;

    struct Fixed(f32);

    impl WorkloadProperties for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn target_value(&self) -> f32 {
            self.0
        }

        fn loss_type(&self) -> LossType {
            LossType::SoftmaxCrossEntropy
        }

        fn train_mean(&self) -> [f32; 3] {
            [0.; 3]
        }

        fn train_stddev(&self) -> [f32; 3] {
            [1.; 3]
        }

        fn num_train_examples(&self) -> usize {
            1
        }

        fn num_eval_examples(&self) -> usize {
            1
        }

        fn num_classes(&self) -> usize {
            2
        }

        fn max_allowed_runtime(&self) -> Duration {
            Duration::from_secs(1)
        }

        fn eval_period(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    fn summary(accuracy: f32) -> EvalSummary {
        EvalSummary {
            loss: 1.,
            accuracy,
            num_batches: 1,
            num_examples: 200,
        }
    }

    #[test]
    fn goal_comparison_is_strict() {
        let w = Fixed(0.76);
        assert!(!w.has_reached_goal(&summary(0.76)));
        assert!(w.has_reached_goal(&summary(0.7601)));
        assert!(!w.has_reached_goal(&summary(0.5)));
    }

    #[test]
    fn batch_metrics_average_fieldwise() {
        let m = pmean(&[
            BatchMetrics {
                loss: 1.,
                accuracy: 0.5,
            },
            BatchMetrics {
                loss: 3.,
                accuracy: 1.,
            },
        ])
        .unwrap();

        assert_eq!(
            m,
            BatchMetrics {
                loss: 2.,
                accuracy: 0.75
            }
        );
    }
}
