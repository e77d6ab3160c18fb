use api::Result;
use ndarray::{Array2, ArrayView1, ArrayView2};

use super::{LossFn, loss_fn::one_hot};

/// Mean squared error between the logits and the one-hot labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl Mse {
    /// Returns a new `Mse`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, logits: ArrayView2<f32>, labels: ArrayView1<u32>) -> Result<f32> {
        let y = one_hot(labels, logits.ncols())?;
        Ok((&logits - &y)
            .mapv(|x| x.powi(2))
            .mean()
            .unwrap_or_default())
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, labels: ArrayView1<u32>) -> Result<Array2<f32>> {
        let y = one_hot(labels, logits.ncols())?;
        Ok((&logits - &y) * (2.0 / logits.len() as f32))
    }
}
