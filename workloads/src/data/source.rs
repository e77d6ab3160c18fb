use std::path::Path;

use api::{BenchErr, Result, Split};
use log::info;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal, Uniform};

use super::InMemoryDataset;

/// Provides the raw examples of a dataset split.
pub trait DataSource: Send + Sync {
    /// Loads a split.
    ///
    /// # Arguments
    /// * `split` - The split to load.
    /// * `data_dir` - Where the dataset lives.
    /// * `num_examples` - The size of the split.
    ///
    /// # Returns
    /// The raw, unnormalized examples, at most `num_examples` of them.
    fn load(&self, split: Split, data_dir: &Path, num_examples: usize) -> Result<InMemoryDataset>;
}

/// Generates images around one random prototype per class.
///
/// The data only depends on the seed and the split, so every load of a split returns the same
/// examples.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    features: usize,
    num_classes: usize,
    seed: u64,
    noise: f32,
    max_examples: usize,
}

impl SyntheticSource {
    pub const DEFAULT_MAX_EXAMPLES: usize = 4096;

    /// Creates a new `SyntheticSource`.
    ///
    /// # Arguments
    /// * `features` - The size of a flattened image.
    /// * `num_classes` - The amount of classes.
    /// * `seed` - Seeds both the prototypes and the examples.
    pub fn new(features: usize, num_classes: usize, seed: u64) -> Self {
        Self {
            features,
            num_classes,
            seed,
            noise: 48.,
            max_examples: Self::DEFAULT_MAX_EXAMPLES,
        }
    }

    /// Caps the amount of distinct examples generated per split.
    pub fn with_max_examples(mut self, max_examples: usize) -> Self {
        self.max_examples = max_examples;
        self
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise;
        self
    }

    fn split_seed(&self, split: Split) -> u64 {
        match split {
            Split::Train => self.seed ^ 0x7472_6169_6e00_0000,
            Split::Test => self.seed ^ 0x7465_7374_0000_0000,
        }
    }
}

impl DataSource for SyntheticSource {
    fn load(&self, split: Split, _data_dir: &Path, num_examples: usize) -> Result<InMemoryDataset> {
        let n = num_examples.min(self.max_examples);
        if n == 0 || self.num_classes == 0 {
            return Err(BenchErr::DataSource(format!(
                "can't generate {n} examples of {} classes",
                self.num_classes
            )));
        }

        let invalid = |e: rand_distr::uniform::Error| BenchErr::DataSource(e.to_string());
        let pixel = Uniform::new(0., 255.).map_err(invalid)?;
        let class = Uniform::new(0, self.num_classes as u32).map_err(invalid)?;
        let noise =
            Normal::new(0., self.noise).map_err(|e| BenchErr::DataSource(e.to_string()))?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let prototypes = Array2::from_shape_simple_fn((self.num_classes, self.features), || {
            pixel.sample(&mut rng)
        });

        let mut rng = StdRng::seed_from_u64(self.split_seed(split));
        let labels = Array1::from_shape_simple_fn(n, || class.sample(&mut rng));
        let mut inputs = Array2::zeros((n, self.features));
        for (mut row, &label) in inputs.rows_mut().into_iter().zip(&labels) {
            let prototype = prototypes.row(label as usize);
            row.zip_mut_with(&prototype, |x, &p| {
                *x = (p + noise.sample(&mut rng)).clamp(0., 255.);
            });
        }

        info!(split:? = split, examples = n; "generated synthetic split");
        InMemoryDataset::new(inputs, labels)
    }
}
