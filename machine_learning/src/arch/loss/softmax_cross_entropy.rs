use api::Result;
use ndarray::{Array2, ArrayView1, ArrayView2, Zip};

use super::{LossFn, loss_fn::check_labels};
use crate::arch::activations::softmax;

/// Softmax cross entropy against integer labels, averaged over the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftmaxCrossEntropy;

impl LossFn for SoftmaxCrossEntropy {
    fn loss(&self, logits: ArrayView2<f32>, labels: ArrayView1<u32>) -> Result<f32> {
        if labels.is_empty() {
            return Ok(0.);
        }
        check_labels(labels, logits.ncols())?;

        let per_example = Zip::from(logits.rows())
            .and(&labels)
            .par_map_collect(|row, &label| {
                let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
                let log_sum_exp = row.mapv(|x| (x - max).exp()).sum().ln() + max;
                log_sum_exp - row[label as usize]
            });

        Ok(per_example.sum() / labels.len() as f32)
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, labels: ArrayView1<u32>) -> Result<Array2<f32>> {
        check_labels(labels, logits.ncols())?;

        let n = labels.len().max(1) as f32;
        let mut grad = softmax(logits);

        Zip::from(grad.rows_mut())
            .and(&labels)
            .par_for_each(|mut row, &label| {
                row[label as usize] -= 1.;
                row /= n;
            });

        Ok(grad)
    }
}
