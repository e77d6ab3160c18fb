use ndarray::{Array2, ArrayView2, Axis};

/// Per-channel standardization of flattened `[height, width, channels]` images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    mean: [f32; 3],
    stddev: [f32; 3],
}

impl Normalizer {
    pub fn new(mean: [f32; 3], stddev: [f32; 3]) -> Self {
        Self { mean, stddev }
    }

    /// Standardizes every row, feature `j` belongs to channel `j % 3`.
    pub fn apply(&self, raw: ArrayView2<f32>) -> Array2<f32> {
        let mut out = raw.to_owned();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for (j, x) in row.iter_mut().enumerate() {
                let c = j % 3;
                *x = (*x - self.mean[c]) / self.stddev[c];
            }
        }
        out
    }
}
