use std::f64::consts::PI;

use api::Hyperparameters;
use log::debug;

/// The batch size the base learning rate is quoted for.
const REFERENCE_BATCH_SIZE: f32 = 256.;

/// A learning rate as a function of the optimizer step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LrSchedule {
    Constant(f32),
    /// Linear warmup from zero to `base`, then cosine decay from `base` to zero.
    WarmupCosine {
        base: f32,
        warmup_steps: u64,
        decay_steps: u64,
    },
}

impl LrSchedule {
    /// Creates the warmup and cosine decay schedule of a run.
    ///
    /// # Arguments
    /// * `hparams` - The hyperparameters of the run.
    /// * `steps_per_epoch` - The amount of steps an epoch takes.
    /// * `batch_size` - The global batch size, scales the base learning rate.
    ///
    /// # Returns
    /// A new `LrSchedule::WarmupCosine`.
    pub fn warmup_cosine(hparams: &Hyperparameters, steps_per_epoch: usize, batch_size: usize) -> Self {
        let base = hparams.learning_rate * batch_size as f32 / REFERENCE_BATCH_SIZE;
        let spe = steps_per_epoch as u64;
        let warmup_steps = hparams.warmup_epochs as u64 * spe;
        let decay_epochs = hparams.num_epochs.saturating_sub(hparams.warmup_epochs).max(1);
        let decay_steps = decay_epochs as u64 * spe;

        debug!(base = base, warmup_steps = warmup_steps, decay_steps = decay_steps; "warmup cosine schedule");
        Self::WarmupCosine {
            base,
            warmup_steps,
            decay_steps,
        }
    }

    /// The learning rate at `step`.
    pub fn value(&self, step: u64) -> f32 {
        match *self {
            Self::Constant(lr) => lr,
            Self::WarmupCosine {
                base,
                warmup_steps,
                decay_steps,
            } => {
                if step < warmup_steps {
                    return (base as f64 * step as f64 / warmup_steps as f64) as f32;
                }

                let t = (step - warmup_steps).min(decay_steps) as f64 / decay_steps.max(1) as f64;
                (base as f64 * 0.5 * (1. + (PI * t).cos())) as f32
            }
        }
    }
}
