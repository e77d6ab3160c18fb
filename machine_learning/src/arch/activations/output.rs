use api::LossType;
use ndarray::{Array2, ArrayView2, Axis};

/// Row-wise softmax.
pub fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut out = logits.to_owned();
    out.axis_iter_mut(Axis(0)).for_each(|mut row| {
        let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        row /= sum;
    });
    out
}

/// Element-wise logistic function.
pub fn sigmoid(logits: ArrayView2<f32>) -> Array2<f32> {
    logits.mapv(|z| 1. / (1. + (-z).exp()))
}

/// Turns logits into predictions, the inverse link of the loss.
///
/// # Arguments
/// * `logits` - The raw model outputs.
/// * `loss_type` - The loss the model is trained with.
///
/// # Returns
/// Class probabilities for the cross entropies, the logits themselves for squared error.
pub fn output_activation(logits: ArrayView2<f32>, loss_type: LossType) -> Array2<f32> {
    match loss_type {
        LossType::SoftmaxCrossEntropy => softmax(logits),
        LossType::SigmoidCrossEntropy => sigmoid(logits),
        LossType::MeanSquaredError => logits.to_owned(),
    }
}
