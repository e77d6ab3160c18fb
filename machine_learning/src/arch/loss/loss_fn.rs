use api::{BenchErr, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};

/// A classification loss over a batch of logits.
pub trait LossFn {
    /// The mean loss of the batch.
    ///
    /// # Returns
    /// The loss, or a `LabelOutOfRange` error if a label doesn't index a column of `logits`.
    fn loss(&self, logits: ArrayView2<f32>, labels: ArrayView1<u32>) -> Result<f32>;

    /// The gradient of [`LossFn::loss`] with respect to the logits.
    fn loss_prime(&self, logits: ArrayView2<f32>, labels: ArrayView1<u32>) -> Result<Array2<f32>>;
}

/// Checks every label indexes one of the `classes` columns of the logits.
pub(super) fn check_labels(labels: ArrayView1<u32>, classes: usize) -> Result<()> {
    match labels.iter().find(|&&label| label as usize >= classes) {
        Some(&label) => Err(BenchErr::LabelOutOfRange { label, classes }),
        None => Ok(()),
    }
}

/// Expands integer labels into one-hot rows as wide as `logits`.
pub(super) fn one_hot(labels: ArrayView1<u32>, classes: usize) -> Result<Array2<f32>> {
    check_labels(labels, classes)?;

    let mut y = Array2::zeros((labels.len(), classes));
    for (mut row, &label) in y.rows_mut().into_iter().zip(labels) {
        row[label as usize] = 1.;
    }
    Ok(y)
}
