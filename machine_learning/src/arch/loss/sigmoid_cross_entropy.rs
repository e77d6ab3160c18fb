use api::Result;
use ndarray::{Array2, ArrayView1, ArrayView2, Zip};

use super::{LossFn, loss_fn::one_hot};
use crate::arch::activations::sigmoid;

/// Element-wise sigmoid cross entropy against one-hot labels, summed over classes and averaged
/// over the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SigmoidCrossEntropy;

impl LossFn for SigmoidCrossEntropy {
    fn loss(&self, logits: ArrayView2<f32>, labels: ArrayView1<u32>) -> Result<f32> {
        if labels.is_empty() {
            return Ok(0.);
        }

        let y = one_hot(labels, logits.ncols())?;
        let total = Zip::from(&logits)
            .and(&y)
            .fold(0., |acc, &z, &y| {
                acc + z.max(0.) - z * y + (-z.abs()).exp().ln_1p()
            });

        Ok(total / labels.len() as f32)
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, labels: ArrayView1<u32>) -> Result<Array2<f32>> {
        let n = labels.len().max(1) as f32;
        let y = one_hot(labels, logits.ncols())?;
        Ok((sigmoid(logits) - y) / n)
    }
}
