use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};

use crate::{BenchErr, Result};

/// A batch of aligned inputs and labels.
///
/// The leading dimension of both arrays is the batch size.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    inputs: Array2<f32>,
    labels: Array1<u32>,
}

/// A borrowed slice of a `Batch`, the part a single replica works on.
#[derive(Debug, Clone, Copy)]
pub struct BatchShard<'a> {
    pub inputs: ArrayView2<'a, f32>,
    pub labels: ArrayView1<'a, u32>,
}

impl Batch {
    /// Creates a new `Batch`.
    ///
    /// # Arguments
    /// * `inputs` - The examples, one per row.
    /// * `labels` - The label of each example.
    ///
    /// # Returns
    /// A new `Batch` or an error if there isn't a label per example.
    pub fn new(inputs: Array2<f32>, labels: Array1<u32>) -> Result<Self> {
        if inputs.nrows() != labels.len() {
            return Err(BenchErr::InvalidConfig(format!(
                "batch has {} inputs but {} labels",
                inputs.nrows(),
                labels.len()
            )));
        }

        Ok(Self { inputs, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn inputs(&self) -> ArrayView2<'_, f32> {
        self.inputs.view()
    }

    pub fn labels(&self) -> ArrayView1<'_, u32> {
        self.labels.view()
    }

    pub fn into_parts(self) -> (Array2<f32>, Array1<u32>) {
        (self.inputs, self.labels)
    }

    /// Splits the batch into `replicas` contiguous shards of equal size.
    ///
    /// # Arguments
    /// * `replicas` - The amount of shards, one per replica.
    ///
    /// # Returns
    /// The shards in replica order or a `BatchNotDivisible` error.
    pub fn partition(&self, replicas: usize) -> Result<Vec<BatchShard<'_>>> {
        if replicas == 0 || self.len() % replicas != 0 {
            return Err(BenchErr::BatchNotDivisible {
                batch_size: self.len(),
                replicas,
            });
        }

        let shard = self.len() / replicas;
        let shards = (0..replicas)
            .map(|i| {
                let rows = i * shard..(i + 1) * shard;
                BatchShard {
                    inputs: self.inputs.slice(s![rows.clone(), ..]),
                    labels: self.labels.slice(s![rows]),
                }
            })
            .collect();

        Ok(shards)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2};

    use super::*;

    fn batch(n: usize) -> Batch {
        let inputs = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f32);
        let labels = Array1::from_iter(0..n as u32);
        Batch::new(inputs, labels).unwrap()
    }

    #[test]
    fn partition_yields_contiguous_equal_shards() {
        let b = batch(8);
        let shards = b.partition(4).unwrap();

        assert_eq!(shards.len(), 4);
        for (i, shard) in shards.iter().enumerate() {
            assert_eq!(shard.inputs.nrows(), 2);
            assert_eq!(shard.labels.to_vec(), vec![2 * i as u32, 2 * i as u32 + 1]);
            assert_eq!(shard.inputs[[0, 0]], (4 * i) as f32);
        }
    }

    #[test]
    fn partition_rejects_uneven_batches() {
        let err = batch(10).partition(4).unwrap_err();
        assert!(matches!(
            err,
            BenchErr::BatchNotDivisible {
                batch_size: 10,
                replicas: 4
            }
        ));
    }

    #[test]
    fn new_rejects_misaligned_labels() {
        let inputs = Array2::zeros((3, 2));
        let labels = Array1::zeros(2);
        assert!(Batch::new(inputs, labels).is_err());
    }
}
