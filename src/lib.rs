//! Drives a submission against a workload under the time budget of the benchmark.
//!
//! Only training time counts against the budget, evaluations are timed separately and run
//! whenever one evaluation period of training time has passed since the previous one.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use api::{
    AuxState, EvalSummary, Hyperparameters, InitModel, Params, RandomState, Result, Split,
    Submission, Workload, WorkloadProperties,
};
use log::{debug, info};
use serde::Serialize;

/// Overrides of a run, the workload's own budget applies to everything left unset.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub data_dir: PathBuf,
    pub max_steps: Option<usize>,
    pub max_runtime: Option<Duration>,
    pub eval_period: Option<Duration>,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ReachedGoal,
    OutOfTime,
    StepLimit,
}

/// One evaluation of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvalRecord {
    /// The amount of completed training steps.
    pub step: usize,
    pub train_secs: f64,
    #[serde(flatten)]
    pub summary: EvalSummary,
}

/// The outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub workload: String,
    pub steps: usize,
    pub train_secs: f64,
    pub reached_goal: bool,
    pub stop: StopReason,
    pub evals: Vec<EvalRecord>,
}

/// Trains `workload` with `submission` until the goal is reached or the budget runs out.
///
/// # Arguments
/// * `workload` - The workload, its model gets initialized here.
/// * `submission` - The training algorithm.
/// * `hparams` - The hyperparameters of the run.
/// * `rng` - The root stream of the run.
/// * `config` - The overrides of the run.
///
/// # Returns
/// The report of the run, or the first error the workload or the submission raised.
pub fn run<I, S>(
    workload: I,
    submission: &S,
    hparams: &Hyperparameters,
    rng: RandomState,
    config: &RunnerConfig,
) -> Result<RunReport>
where
    I: InitModel,
    S: Submission,
{
    hparams.validate()?;

    let (init_rng, loop_rng) = rng.split2();
    let (model_rng, opt_rng) = init_rng.split2();
    let (data_rng, loop_rng) = loop_rng.split2();
    let (step_root, eval_root) = loop_rng.split2();

    let (workload, mut params, mut aux) = workload.init_model_fn(model_rng)?;
    let batch_size = submission.get_batch_size(workload.name());
    let mut queue = workload.build_input_queue(data_rng, Split::Train, &config.data_dir, batch_size)?;
    let mut state = submission.init_optimizer_state(&workload, &params, &aux, hparams, opt_rng)?;

    let param_types = workload.model_params_types();
    let loss_type = workload.loss_type();
    let max_runtime = config.max_runtime.unwrap_or(workload.max_allowed_runtime());
    let eval_period = config.eval_period.unwrap_or(workload.eval_period());

    info!(
        workload = workload.name(),
        batch_size = batch_size,
        max_runtime_secs = max_runtime.as_secs_f64(),
        eval_period_secs = eval_period.as_secs_f64();
        "starting run"
    );

    let mut eval_results: Vec<(usize, EvalSummary)> = Vec::new();
    let mut records = Vec::new();
    let mut train_time = Duration::ZERO;
    let mut last_eval = Duration::ZERO;
    let mut step = 0;

    // returns whether the goal was reached
    let mut evaluate = |step: usize,
                        train_time: Duration,
                        params: &Params,
                        aux: &AuxState,
                        results: &mut Vec<(usize, EvalSummary)>|
     -> Result<bool> {
        let summary =
            workload.eval_model(params, aux, eval_root.fold_in(step as u64), &config.data_dir)?;
        results.push((step, summary));
        records.push(EvalRecord {
            step,
            train_secs: train_time.as_secs_f64(),
            summary,
        });
        Ok(workload.has_reached_goal(&summary))
    };

    let stop = loop {
        if config.max_steps.is_some_and(|max| step >= max) {
            break StopReason::StepLimit;
        }

        if train_time >= max_runtime {
            break StopReason::OutOfTime;
        }

        let start = Instant::now();
        let (selection_rng, update_rng) = step_root.fold_in(step as u64).split2();
        let batch = submission.data_selection(
            &workload,
            &mut queue,
            &state,
            &params,
            hparams,
            step,
            selection_rng,
        )?;

        (state, params, aux) = submission.update_params(
            &workload,
            params,
            &param_types,
            aux,
            hparams,
            batch,
            loss_type,
            state,
            &eval_results,
            step,
            update_rng,
        )?;

        train_time += start.elapsed();
        step += 1;
        debug!(step = step, train_secs = train_time.as_secs_f64(); "step done");

        if train_time - last_eval >= eval_period {
            last_eval = train_time;
            if evaluate(step, train_time, &params, &aux, &mut eval_results)? {
                break StopReason::ReachedGoal;
            }
        }
    };

    let evaluated_last = eval_results.last().is_some_and(|&(s, _)| s == step);
    if step > 0 && !evaluated_last {
        evaluate(step, train_time, &params, &aux, &mut eval_results)?;
    }

    let reached_goal = eval_results
        .iter()
        .any(|(_, summary)| workload.has_reached_goal(summary));

    info!(
        workload = workload.name(),
        steps = step,
        stop:? = stop,
        reached_goal = reached_goal;
        "run finished"
    );

    Ok(RunReport {
        workload: workload.name().to_owned(),
        steps: step,
        train_secs: train_time.as_secs_f64(),
        reached_goal,
        stop,
        evals: records,
    })
}
