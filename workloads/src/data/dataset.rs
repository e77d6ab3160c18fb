use api::{BenchErr, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// A split held entirely in memory, one flattened raw image per row.
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryDataset {
    inputs: Array2<f32>,
    labels: Array1<u32>,
}

impl InMemoryDataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Arguments
    /// * `inputs` - The examples, one per row.
    /// * `labels` - The label of each example.
    ///
    /// # Returns
    /// A new `InMemoryDataset` or an error if the buffers aren't aligned or are empty.
    pub fn new(inputs: Array2<f32>, labels: Array1<u32>) -> Result<Self> {
        if inputs.nrows() != labels.len() {
            return Err(BenchErr::DataSource(format!(
                "{} inputs but {} labels",
                inputs.nrows(),
                labels.len()
            )));
        }

        if labels.is_empty() {
            return Err(BenchErr::DataSource("dataset must be non-empty".into()));
        }

        Ok(Self { inputs, labels })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn features(&self) -> usize {
        self.inputs.ncols()
    }

    #[inline]
    pub fn inputs(&self) -> ArrayView2<'_, f32> {
        self.inputs.view()
    }

    #[inline]
    pub fn labels(&self) -> ArrayView1<'_, u32> {
        self.labels.view()
    }
}
