use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use algoperf::{RunnerConfig, StopReason, run};
use api::{Hyperparameters, RandomState, ReplicaPool};
use machine_learning::ModelId;
use submissions::NesterovSubmission;
use workloads::{DatasetId, ImagenetWorkload, WorkloadConfig};

fn hparams() -> Hyperparameters {
    Hyperparameters {
        learning_rate: 0.1,
        momentum: 0.9,
        l2: 5e-5,
        warmup_epochs: 0,
        num_epochs: 2,
    }
}

fn workload(seed: u64) -> ImagenetWorkload {
    let config = WorkloadConfig {
        dataset: DatasetId::Imagenette,
        model: ModelId::BnMlpSmall,
        input_shape: [2, 2, 3],
        num_train_examples: Some(512),
        num_eval_examples: Some(400),
    };
    let pool = Arc::new(ReplicaPool::new(NonZeroUsize::new(2).unwrap()).unwrap());
    ImagenetWorkload::synthetic(config, pool, seed).unwrap()
}

#[test]
fn step_limit_ends_the_run_with_a_final_evaluation() {
    let config = RunnerConfig {
        max_steps: Some(6),
        eval_period: Some(Duration::from_secs(3600)),
        ..RunnerConfig::default()
    };
    let report = run(
        workload(0),
        &NesterovSubmission::with_batch_size(64),
        &hparams(),
        RandomState::from_seed(1),
        &config,
    )
    .unwrap();

    assert_eq!(report.workload, "imagenette");
    assert_eq!(report.steps, 6);
    assert_eq!(report.stop, StopReason::StepLimit);
    assert_eq!(report.evals.len(), 1);
    assert_eq!(report.evals[0].step, 6);
    assert_eq!(report.evals[0].summary.num_batches, 2);
}

#[test]
fn evaluates_on_every_period() {
    let config = RunnerConfig {
        max_steps: Some(5),
        eval_period: Some(Duration::ZERO),
        ..RunnerConfig::default()
    };
    let report = run(
        workload(0),
        &NesterovSubmission::with_batch_size(64),
        &hparams(),
        RandomState::from_seed(1),
        &config,
    )
    .unwrap();

    // one evaluation after every step, unless the goal stops the run early
    assert_eq!(report.evals.len(), report.steps);
    for (i, record) in report.evals.iter().enumerate() {
        assert_eq!(record.step, i + 1);
        assert!((0. ..=1.).contains(&record.summary.accuracy));
    }

    if report.reached_goal {
        assert_eq!(report.stop, StopReason::ReachedGoal);
        assert!(report.evals.last().unwrap().summary.accuracy > 0.76);
    } else {
        assert_eq!(report.steps, 5);
    }
}

#[test]
fn empty_budget_trains_nothing() {
    let config = RunnerConfig {
        max_runtime: Some(Duration::ZERO),
        ..RunnerConfig::default()
    };
    let report = run(
        workload(0),
        &NesterovSubmission::with_batch_size(64),
        &hparams(),
        RandomState::from_seed(1),
        &config,
    )
    .unwrap();

    assert_eq!(report.stop, StopReason::OutOfTime);
    assert_eq!(report.steps, 0);
    assert!(report.evals.is_empty());
    assert!(!report.reached_goal);
}

#[test]
fn runs_are_reproducible() {
    let config = RunnerConfig {
        max_steps: Some(4),
        eval_period: Some(Duration::from_secs(3600)),
        ..RunnerConfig::default()
    };
    let once = |seed| {
        run(
            workload(seed),
            &NesterovSubmission::with_batch_size(64),
            &hparams(),
            RandomState::from_seed(seed),
            &config,
        )
        .unwrap()
    };

    let (a, b) = (once(3), once(3));
    assert_eq!(a.evals[0].summary, b.evals[0].summary);
}

#[test]
fn report_serializes_to_json() {
    let config = RunnerConfig {
        max_steps: Some(1),
        ..RunnerConfig::default()
    };
    let report = run(
        workload(0),
        &NesterovSubmission::with_batch_size(64),
        &hparams(),
        RandomState::from_seed(1),
        &config,
    )
    .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["stop"], "step_limit");
    assert_eq!(json["evals"][0]["step"], 1);
    assert!(json["evals"][0]["accuracy"].is_number());
}
