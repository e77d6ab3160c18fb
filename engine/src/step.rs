use api::{
    AuxState, Batch, GradientTransformation, Hyperparameters, OptimizerState, Paired, Params,
    RandomState, Replicated, Result, TensorTree, Workload, pmean,
};
use log::debug;

use crate::layout::StepLayout;

/// The optimizer state of every replica.
pub type ReplicatedState<S> = Replicated<OptimizerState<S>>;

/// Everything a training step hands back to the driver.
#[derive(Debug)]
pub struct StepOutput<S> {
    pub params: Params,
    /// The replica-local auxiliary states, diverged until the next synchronization.
    pub aux: AuxState,
    pub optimizer_state: ReplicatedState<S>,
    /// The total loss of the step averaged across replicas, for logging only.
    pub loss: f32,
}

/// A data-parallel training step compiled for a gradient transformation.
///
/// Each invocation partitions the batch across the replicas, computes local gradients,
/// averages them with a single cross-replica reduction and applies the same update on every
/// replica, so the parameters stay identical everywhere.
#[derive(Debug)]
pub struct TrainStep<T> {
    layout: StepLayout,
    optimizer: Paired<T>,
}

impl<T: GradientTransformation> TrainStep<T> {
    /// Compiles the training step around `transform`.
    ///
    /// # Arguments
    /// * `transform` - The optimizer the step applies.
    ///
    /// # Returns
    /// A new `TrainStep` with the train layout.
    pub fn compile(transform: T) -> Self {
        let layout = StepLayout::train();
        let optimizer = Paired::new(transform);
        debug!(tag = optimizer.tag().get(); "compiled train step");

        Self { layout, optimizer }
    }

    pub fn layout(&self) -> &StepLayout {
        &self.layout
    }

    pub fn optimizer(&self) -> &Paired<T> {
        &self.optimizer
    }

    /// Creates the optimizer state of every replica, paired with this step.
    pub fn init_state(&self, params: &Params) -> ReplicatedState<T::State> {
        let states = params.iter().map(|p| self.optimizer.init(p)).collect();
        Replicated::from_replicas(states)
    }

    /// Runs one training step.
    ///
    /// # Arguments
    /// * `workload` - The workload providing the model, the loss and the replicas.
    /// * `params` - The replicated parameters.
    /// * `aux` - The replicated auxiliary state.
    /// * `state` - The replicated optimizer state, created by this step.
    /// * `hparams` - The hyperparameters, broadcast to every replica.
    /// * `batch` - The global batch, partitioned across replicas.
    /// * `rng` - The step stream, split once per replica.
    ///
    /// # Returns
    /// The new parameters, auxiliary and optimizer states, or the first error a replica hit.
    #[allow(clippy::too_many_arguments)]
    pub fn run<W: Workload>(
        &self,
        workload: &W,
        params: Params,
        aux: AuxState,
        state: ReplicatedState<T::State>,
        hparams: &Hyperparameters,
        batch: &Batch,
        rng: RandomState,
    ) -> Result<StepOutput<T::State>> {
        let pool = workload.pool();
        let replicas = pool.replicas();
        self.layout.validate(
            replicas,
            &[
                ("params", params.len()),
                ("aux_state", aux.len()),
                ("optimizer_state", state.len()),
                ("batch", batch.len()),
            ],
        )?;

        let shapes = workload.param_shapes();
        let l2 = hparams.l2;
        let inputs = batch.partition(replicas)?.into_iter().zip(rng.split(replicas)).collect();

        let locals = pool.fan_out(inputs, |i, (shard, rng)| {
            let p = params.replica(i);
            let out = workload.model_vjp(p, shard.inputs, aux.local(i), rng, &|logits| {
                workload.loss_grad(shard.labels, logits)
            })?;

            let loss = workload.loss_fn(shard.labels, out.logits.view())? + weight_penalty(p, l2);
            let grads = add_weight_decay(&out.grads, p, l2)?;
            grads.check_shapes("gradients", shapes)?;

            Ok((grads, out.aux, loss))
        })?;

        let mut grads = Vec::with_capacity(replicas);
        let mut auxes = Vec::with_capacity(replicas);
        let mut losses = Vec::with_capacity(replicas);
        for (g, a, l) in locals {
            grads.push(g);
            auxes.push(a);
            losses.push(l);
        }

        let grads = pmean(&grads)?;
        let loss = pmean(&losses)?;

        let inputs = params
            .into_replicas()
            .into_iter()
            .zip(state.into_replicas())
            .collect();

        let updated = pool.fan_out(inputs, |_, (p, s)| {
            let (updates, s) = self.optimizer.update(&grads, &s, &p)?;
            Ok((p.apply_updates(&updates)?, s))
        })?;

        let (params, states): (Vec<_>, Vec<_>) = updated.into_iter().unzip();
        debug!(loss = loss, replicas = replicas; "train step done");

        Ok(StepOutput {
            params: Replicated::from_replicas(params),
            aux: AuxState::from_local(auxes),
            optimizer_state: Replicated::from_replicas(states),
            loss,
        })
    }
}

/// The L2 penalty `l2 / 2 * sum(w^2)` over every leaf of rank greater than one.
pub fn weight_penalty(params: &TensorTree, l2: f32) -> f32 {
    if l2 == 0. {
        return 0.;
    }

    let sum: f32 = params
        .iter()
        .filter(|(_, w)| w.ndim() > 1)
        .map(|(_, w)| w.iter().map(|x| x * x).sum::<f32>())
        .sum();

    0.5 * l2 * sum
}

/// Adds the gradient of [`weight_penalty`] to `grads`.
pub fn add_weight_decay(grads: &TensorTree, params: &TensorTree, l2: f32) -> Result<TensorTree> {
    grads.zip_map(params, |_, g, w| {
        if l2 != 0. && w.ndim() > 1 {
            g + &(w * l2)
        } else {
            g.clone()
        }
    })
}
