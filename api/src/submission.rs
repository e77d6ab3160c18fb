use std::{
    fmt::{self, Display},
    sync::atomic::{AtomicU64, Ordering},
};

use log::debug;

use crate::{
    AuxState, Batch, BenchErr, Params, RandomState, Result,
    config::{Hyperparameters, LossType, ParameterTypeTree},
    tree::TensorTree,
    workload::{EvalSummary, Workload},
};

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

/// Identifies the `Paired` transformation an optimizer state was created by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairingTag(u64);

impl PairingTag {
    fn fresh() -> Self {
        Self(NEXT_TAG.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for PairingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An optimizer as an `(init, update)` pair of pure functions.
pub trait GradientTransformation: Send + Sync {
    /// The buffers the optimizer carries from one step to the next.
    type State: Clone + Send + Sync;

    /// Creates the initial state for `params`.
    fn init(&self, params: &TensorTree) -> Self::State;

    /// Computes the parameter updates for a step.
    ///
    /// # Arguments
    /// * `grads` - The averaged gradient.
    /// * `state` - The state returned by the previous call, or by `init`.
    /// * `params` - The current parameters.
    ///
    /// # Returns
    /// The updates to add to the parameters and the next state.
    fn update(
        &self,
        grads: &TensorTree,
        state: &Self::State,
        params: &TensorTree,
    ) -> Result<(TensorTree, Self::State)>;
}

/// Optimizer buffers stamped with the transformation that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerState<S> {
    tag: PairingTag,
    inner: S,
}

impl<S> OptimizerState<S> {
    pub fn tag(&self) -> PairingTag {
        self.tag
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

/// A `GradientTransformation` whose states can only be fed back to itself.
#[derive(Debug)]
pub struct Paired<T> {
    tag: PairingTag,
    transform: T,
}

impl<T: GradientTransformation> Paired<T> {
    /// Creates a new `Paired` transformation with a tag no other instance shares.
    pub fn new(transform: T) -> Self {
        let tag = PairingTag::fresh();
        debug!(tag = tag.get(); "paired optimizer transformation");
        Self { tag, transform }
    }

    pub fn tag(&self) -> PairingTag {
        self.tag
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// Creates the initial optimizer state for `params`.
    pub fn init(&self, params: &TensorTree) -> OptimizerState<T::State> {
        OptimizerState {
            tag: self.tag,
            inner: self.transform.init(params),
        }
    }

    /// Runs the wrapped update after checking `state` was created by this instance.
    ///
    /// # Returns
    /// The updates and the next state, or an `UnpairedOptimizerState` error.
    pub fn update(
        &self,
        grads: &TensorTree,
        state: &OptimizerState<T::State>,
        params: &TensorTree,
    ) -> Result<(TensorTree, OptimizerState<T::State>)> {
        if state.tag != self.tag {
            return Err(BenchErr::UnpairedOptimizerState {
                expected: self.tag.get(),
                got: state.tag.get(),
            });
        }

        let (updates, inner) = self.transform.update(grads, &state.inner, params)?;
        let state = OptimizerState {
            tag: self.tag,
            inner,
        };

        Ok((updates, state))
    }
}

/// A training algorithm competing on the benchmark.
pub trait Submission {
    /// Everything the submission threads from one step to the next.
    type OptimizerState: Send;

    /// The global batch size the submission trains `workload_name` with.
    fn get_batch_size(&self, workload_name: &str) -> usize;

    /// Creates the optimizer state, replicated like the parameters.
    ///
    /// # Arguments
    /// * `workload` - The initialized workload.
    /// * `params` - The initial parameters.
    /// * `aux` - The initial auxiliary state.
    /// * `hparams` - The hyperparameters of the run.
    /// * `rng` - A stream the submission may use.
    fn init_optimizer_state<W: Workload>(
        &self,
        workload: &W,
        params: &Params,
        aux: &AuxState,
        hparams: &Hyperparameters,
        rng: RandomState,
    ) -> Result<Self::OptimizerState>;

    /// Picks the batch of the next step.
    ///
    /// The default pulls exactly one batch from the queue.
    #[allow(clippy::too_many_arguments)]
    fn data_selection<W: Workload>(
        &self,
        _workload: &W,
        queue: &mut W::Queue,
        _state: &Self::OptimizerState,
        _params: &Params,
        _hparams: &Hyperparameters,
        _global_step: usize,
        _rng: RandomState,
    ) -> Result<Batch> {
        queue.next().ok_or(BenchErr::InputExhausted {
            what: "training input queue",
        })?
    }

    /// Runs one training step.
    ///
    /// # Returns
    /// The next optimizer state, parameters and auxiliary state, in that order.
    #[allow(clippy::too_many_arguments)]
    fn update_params<W: Workload>(
        &self,
        workload: &W,
        params: Params,
        param_types: &ParameterTypeTree,
        aux: AuxState,
        hparams: &Hyperparameters,
        batch: Batch,
        loss_type: LossType,
        state: Self::OptimizerState,
        eval_results: &[(usize, EvalSummary)],
        global_step: usize,
        rng: RandomState,
    ) -> Result<(Self::OptimizerState, Params, AuxState)>;
}
