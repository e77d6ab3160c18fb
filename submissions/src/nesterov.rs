use api::{
    AuxState, Batch, EvalSummary, Hyperparameters, LossType, ParameterTypeTree, Params,
    RandomState, Result, Submission, Workload,
};
use engine::{EpochSchedule, ReplicatedState, TrainStep};
use log::{debug, info};
use machine_learning::{LrSchedule, Sgd, SgdState};

/// The global batch size of the reference submission.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// SGD with Nesterov momentum, a linear warmup and a cosine decay.
#[derive(Debug, Clone, Copy)]
pub struct NesterovSubmission {
    batch_size: usize,
}

impl Default for NesterovSubmission {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl NesterovSubmission {
    /// Creates a submission training with a custom global batch size.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

/// What the Nesterov submission threads from one step to the next.
#[derive(Debug)]
pub struct NesterovState {
    step: TrainStep<Sgd>,
    optimizer: ReplicatedState<SgdState>,
    epochs: EpochSchedule,
    last_loss: Option<f32>,
}

impl NesterovState {
    pub fn steps_per_epoch(&self) -> usize {
        self.epochs.steps_per_epoch()
    }

    /// The training loss of the last step, if any ran.
    pub fn last_loss(&self) -> Option<f32> {
        self.last_loss
    }

    /// The learning rate the next update will be scaled by.
    pub fn learning_rate(&self) -> f32 {
        let count = self
            .optimizer
            .iter()
            .next()
            .map_or(0, |s| s.inner().count);
        self.step.optimizer().transform().schedule().value(count)
    }
}

impl Submission for NesterovSubmission {
    type OptimizerState = NesterovState;

    fn get_batch_size(&self, _workload_name: &str) -> usize {
        self.batch_size
    }

    fn init_optimizer_state<W: Workload>(
        &self,
        workload: &W,
        params: &Params,
        _aux: &AuxState,
        hparams: &Hyperparameters,
        _rng: RandomState,
    ) -> Result<NesterovState> {
        hparams.validate()?;
        params.expect_replicas("params", workload.pool().replicas())?;
        for p in params.iter() {
            p.check_shapes("parameters", workload.param_shapes())?;
        }

        let batch_size = self.get_batch_size(workload.name());
        let epochs = EpochSchedule::new(workload.num_train_examples(), batch_size)?;
        let schedule = LrSchedule::warmup_cosine(hparams, epochs.steps_per_epoch(), batch_size);

        let step = TrainStep::compile(Sgd::nesterov(schedule, hparams.momentum));
        let optimizer = step.init_state(params);

        info!(
            workload = workload.name(),
            batch_size = batch_size,
            steps_per_epoch = epochs.steps_per_epoch();
            "nesterov optimizer ready"
        );

        Ok(NesterovState {
            step,
            optimizer,
            epochs,
            last_loss: None,
        })
    }

    fn update_params<W: Workload>(
        &self,
        workload: &W,
        params: Params,
        _param_types: &ParameterTypeTree,
        aux: AuxState,
        hparams: &Hyperparameters,
        batch: Batch,
        _loss_type: LossType,
        state: NesterovState,
        _eval_results: &[(usize, EvalSummary)],
        global_step: usize,
        rng: RandomState,
    ) -> Result<(NesterovState, Params, AuxState)> {
        let NesterovState {
            step,
            optimizer,
            epochs,
            ..
        } = state;

        let out = step.run(workload, params, aux, optimizer, hparams, &batch, rng)?;
        let aux = epochs.sync_at_boundary(global_step, out.aux)?;
        debug!(step = global_step, loss = out.loss; "nesterov update");

        let state = NesterovState {
            step,
            optimizer: out.optimizer_state,
            epochs,
            last_loss: Some(out.loss),
        };

        Ok((state, out.params, aux))
    }
}

#[cfg(test)]
mod tests {
    use std::{mem, num::NonZeroUsize, path::Path, sync::Arc};

    use api::{BenchErr, InitModel, ReplicaPool, Split, WorkloadProperties};
    use machine_learning::ModelId;
    use workloads::{DatasetId, ImagenetWorkload, WorkloadConfig};

    use super::*;

    fn hparams() -> Hyperparameters {
        Hyperparameters {
            learning_rate: 0.1,
            momentum: 0.9,
            l2: 5e-5,
            warmup_epochs: 1,
            num_epochs: 4,
        }
    }

    #[test]
    fn state_of_another_run_is_rejected() {
        let config = WorkloadConfig {
            dataset: DatasetId::Imagenette,
            model: ModelId::Linear,
            input_shape: [2, 2, 3],
            num_train_examples: Some(512),
            num_eval_examples: Some(200),
        };
        let pool = Arc::new(ReplicaPool::new(NonZeroUsize::new(2).unwrap()).unwrap());
        let w = ImagenetWorkload::synthetic(config, pool, 0).unwrap();
        let (w, params, aux) = w.init_model_fn(RandomState::from_seed(0)).unwrap();

        let submission = NesterovSubmission::default();
        let hp = hparams();
        let mut ours = submission
            .init_optimizer_state(&w, &params, &aux, &hp, RandomState::from_seed(1))
            .unwrap();
        let mut theirs = submission
            .init_optimizer_state(&w, &params, &aux, &hp, RandomState::from_seed(2))
            .unwrap();
        mem::swap(&mut ours.optimizer, &mut theirs.optimizer);

        let mut queue = w
            .build_input_queue(RandomState::from_seed(3), Split::Train, Path::new("."), 128)
            .unwrap();
        let batch = queue.next().unwrap().unwrap();

        let err = submission
            .update_params(
                &w,
                params,
                &w.model_params_types(),
                aux,
                &hp,
                batch,
                w.loss_type(),
                ours,
                &[],
                0,
                RandomState::from_seed(4),
            )
            .unwrap_err();
        assert!(matches!(err, BenchErr::UnpairedOptimizerState { .. }));
    }

    #[test]
    fn learning_rate_starts_at_zero_during_warmup() {
        let config = WorkloadConfig {
            dataset: DatasetId::Imagenette,
            model: ModelId::Linear,
            input_shape: [2, 2, 3],
            ..WorkloadConfig::default()
        };
        let pool = Arc::new(ReplicaPool::new(NonZeroUsize::new(1).unwrap()).unwrap());
        let w = ImagenetWorkload::synthetic(config, pool, 0).unwrap();
        let (w, params, aux) = w.init_model_fn(RandomState::from_seed(0)).unwrap();

        let state = NesterovSubmission::default()
            .init_optimizer_state(&w, &params, &aux, &hparams(), RandomState::from_seed(1))
            .unwrap();

        assert_eq!(state.steps_per_epoch(), 73);
        assert_eq!(state.learning_rate(), 0.);
        assert!(state.last_loss().is_none());
    }
}
