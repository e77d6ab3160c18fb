use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::RandErr;

/// Standard deviation of a unit normal truncated to `[-2, 2]`.
const TRUNCATED_STDDEV: f32 = 0.879_625_66;

/// How a parameter leaf gets its initial values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initializer {
    Zeros,
    Ones,
    /// Truncated normal with variance `1 / fan_in`.
    LecunNormal { fan_in: usize },
    /// Truncated normal with variance `2 / fan_in`.
    KaimingNormal { fan_in: usize },
}

impl Initializer {
    /// Creates a tensor with the given shape.
    ///
    /// # Arguments
    /// * `rng` - A random number generator, untouched by the constant initializers.
    /// * `shape` - The shape of the tensor.
    ///
    /// # Returns
    /// The new tensor or an error if the distribution is invalid.
    pub fn init<R: Rng>(&self, rng: &mut R, shape: &[usize]) -> Result<ArrayD<f32>, RandErr> {
        let scale = match *self {
            Initializer::Zeros => return Ok(ArrayD::zeros(IxDyn(shape))),
            Initializer::Ones => return Ok(ArrayD::ones(IxDyn(shape))),
            Initializer::LecunNormal { fan_in } => 1. / fan_in.max(1) as f32,
            Initializer::KaimingNormal { fan_in } => 2. / fan_in.max(1) as f32,
        };

        let std_dev = scale.sqrt() / TRUNCATED_STDDEV;
        let normal = Normal::new(0., std_dev)?;
        let bound = 2. * std_dev;

        Ok(ArrayD::from_shape_simple_fn(IxDyn(shape), || loop {
            let x: f32 = normal.sample(&mut *rng);
            if x.abs() <= bound {
                break x;
            }
        }))
    }
}
