use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::{BenchErr, Result, tree::TensorTree};

/// A value that can be averaged arithmetically across replicas.
pub trait Mean: Sized {
    /// Computes the element-wise arithmetic mean of `values`.
    ///
    /// Implementations must return a value bit-identical to the inputs when every input is
    /// bit-identical, that's what makes synchronizing already synchronized state a no-op.
    fn mean_of(values: &[Self]) -> Result<Self>;
}

/// The cross-replica mean, the reduction shared by gradient and statistics averaging.
///
/// # Arguments
/// * `values` - One value per replica.
///
/// # Returns
/// The mean value, or an error if there are no values or their structures disagree.
pub fn pmean<T: Mean>(values: &[T]) -> Result<T> {
    if values.is_empty() {
        return Err(BenchErr::ReplicaCountMismatch {
            what: "cross-replica mean",
            got: 0,
            expected: 1,
        });
    }

    T::mean_of(values)
}

/// Folds `x`, the `k`-th sample (zero based), into the running mean `m`.
///
/// The incremental form keeps `m` untouched when `x == m`.
#[inline]
pub fn fold_mean(m: &mut f32, x: f32, k: usize) {
    *m += (x - *m) / (k + 1) as f32;
}

impl Mean for f32 {
    fn mean_of(values: &[Self]) -> Result<Self> {
        let mut m = values[0];
        for (k, &x) in values.iter().enumerate().skip(1) {
            fold_mean(&mut m, x, k);
        }

        Ok(m)
    }
}

impl Mean for TensorTree {
    fn mean_of(values: &[Self]) -> Result<Self> {
        let first = &values[0];
        let shapes = first.shapes();
        for tree in &values[1..] {
            tree.check_shapes("cross-replica mean", &shapes)?;
        }

        let leaves: BTreeMap<_, _> = first
            .iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(path, leaf)| {
                let mut mean = leaf.clone();
                for (k, tree) in values.iter().enumerate().skip(1) {
                    let x = tree.leaf("cross-replica mean", path)?;
                    mean.zip_mut_with(x, |m, &x| fold_mean(m, x, k));
                }
                Ok((path.clone(), mean))
            })
            .collect::<Result<_>>()?;

        Ok(leaves.into_iter().collect())
    }
}
