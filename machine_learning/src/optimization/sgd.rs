use api::{GradientTransformation, Result, TensorTree};
use ndarray::ArrayD;

use crate::schedule::LrSchedule;

/// The buffers of `Sgd`.
#[derive(Debug, Clone, PartialEq)]
pub struct SgdState {
    /// The momentum buffer, shaped like the parameters.
    pub trace: TensorTree,
    /// The amount of updates applied so far, indexes the learning rate schedule.
    pub count: u64,
}

/// Stochastic gradient descent with optional (Nesterov) momentum.
#[derive(Debug, Clone)]
pub struct Sgd {
    schedule: LrSchedule,
    momentum: f32,
    nesterov: bool,
}

impl Sgd {
    /// Creates a new `Sgd` optimizer.
    ///
    /// # Arguments
    /// * `schedule` - The learning rate of each update.
    /// * `momentum` - The decay of the momentum buffer, zero disables it.
    /// * `nesterov` - Whether to look ahead along the momentum buffer.
    ///
    /// # Returns
    /// A new `Sgd` instance.
    pub fn new(schedule: LrSchedule, momentum: f32, nesterov: bool) -> Self {
        Self {
            schedule,
            momentum,
            nesterov,
        }
    }

    /// Nesterov momentum driven by `schedule`.
    pub fn nesterov(schedule: LrSchedule, momentum: f32) -> Self {
        Self::new(schedule, momentum, true)
    }

    pub fn schedule(&self) -> &LrSchedule {
        &self.schedule
    }
}

impl GradientTransformation for Sgd {
    type State = SgdState;

    fn init(&self, params: &TensorTree) -> SgdState {
        SgdState {
            trace: params.map(|_, p| ArrayD::zeros(p.raw_dim())),
            count: 0,
        }
    }

    /// Updates the momentum buffer as `trace = g + mu * trace` and steps against it, or against
    /// `g + mu * trace` with Nesterov momentum.
    fn update(
        &self,
        grads: &TensorTree,
        state: &SgdState,
        _params: &TensorTree,
    ) -> Result<(TensorTree, SgdState)> {
        let lr = self.schedule.value(state.count);
        let mu = self.momentum;

        let trace = grads.zip_map(&state.trace, |_, g, t| g + &(t * mu))?;
        let updates = if self.nesterov {
            grads.zip_map(&trace, |_, g, t| (g + &(t * mu)) * -lr)?
        } else {
            trace.scale(-lr)
        };

        let state = SgdState {
            trace,
            count: state.count + 1,
        };

        Ok((updates, state))
    }
}
