use std::num::NonZeroUsize;

use api::{AuxState, BenchErr, Result, pmean};
use log::info;

/// Averages the auxiliary state across replicas and writes the mean back to all of them.
///
/// Synchronizing an already synchronized state returns a bit-identical copy.
///
/// # Arguments
/// * `aux` - The replica-local auxiliary states.
///
/// # Returns
/// A synchronized `AuxState` or an error if the replicas' trees don't match.
pub fn sync_replicas(aux: &AuxState) -> Result<AuxState> {
    let mean = pmean(aux.locals())?;
    Ok(AuxState::replicate(mean, aux.len()))
}

/// Defines when an epoch ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochSchedule {
    steps_per_epoch: NonZeroUsize,
}

impl EpochSchedule {
    /// Creates a new `EpochSchedule`.
    ///
    /// # Arguments
    /// * `num_train_examples` - The size of the training split.
    /// * `batch_size` - The global batch size.
    ///
    /// # Returns
    /// A new `EpochSchedule` or an error if not even one batch fits in the split.
    pub fn new(num_train_examples: usize, batch_size: usize) -> Result<Self> {
        let steps = num_train_examples.checked_div(batch_size).unwrap_or(0);
        let steps_per_epoch = NonZeroUsize::new(steps).ok_or_else(|| {
            BenchErr::InvalidConfig(format!(
                "{num_train_examples} training examples don't fill a batch of {batch_size}"
            ))
        })?;

        Ok(Self { steps_per_epoch })
    }

    pub fn steps_per_epoch(&self) -> usize {
        self.steps_per_epoch.get()
    }

    /// Returns true if `global_step` is the last step of an epoch.
    #[inline]
    pub fn is_boundary(&self, global_step: usize) -> bool {
        (global_step + 1) % self.steps_per_epoch.get() == 0
    }

    /// Synchronizes `aux` if `global_step` ends an epoch, otherwise hands it back untouched.
    pub fn sync_at_boundary(&self, global_step: usize, aux: AuxState) -> Result<AuxState> {
        if !self.is_boundary(global_step) {
            return Ok(aux);
        }

        let epoch = (global_step + 1) / self.steps_per_epoch.get();
        info!(epoch = epoch, global_step = global_step; "epoch boundary, syncing batch stats");
        sync_replicas(&aux)
    }
}
