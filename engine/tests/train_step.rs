mod common;

use api::{BenchErr, Hyperparameters, RandomState};
use common::{Sgd, Toy, batch};
use engine::{EpochSchedule, TrainStep, sync_replicas};

fn hparams(l2: f32) -> Hyperparameters {
    Hyperparameters {
        learning_rate: 0.5,
        momentum: 0.,
        l2,
        warmup_epochs: 0,
        num_epochs: 1,
    }
}

#[test]
fn params_stay_identical_across_replicas() {
    let toy = Toy::new(4);
    let (mut params, mut aux) = toy.init(0);
    let step = TrainStep::compile(Sgd(0.5));
    let mut state = step.init_state(&params);
    let mut data = RandomState::from_seed(1).into_rng();
    let root = RandomState::from_seed(2);

    for i in 0..10 {
        let out = step
            .run(&toy, params, aux, state, &hparams(1e-3), &batch(&mut data, 32), root.fold_in(i))
            .unwrap();

        assert!(out.params.is_consistent());
        assert!(out.loss.is_finite());
        (params, aux, state) = (out.params, out.aux, out.optimizer_state);
    }
}

#[test]
fn replica_count_does_not_change_the_update() {
    let mut data = RandomState::from_seed(5).into_rng();
    let b = batch(&mut data, 16);

    let run = |replicas| {
        let toy = Toy::new(replicas);
        let (params, aux) = toy.init(3);
        let step = TrainStep::compile(Sgd(0.1));
        let state = step.init_state(&params);
        let out = step
            .run(&toy, params, aux, state, &hparams(0.), &b, RandomState::from_seed(9))
            .unwrap();
        out.params.unreplicate().unwrap().clone()
    };

    let single = run(1);
    let quad = run(4);
    for ((_, a), (_, b)) in single.iter().zip(quad.iter()) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5, "{x} != {y}");
        }
    }
}

#[test]
fn aux_state_diverges_until_synced() {
    let toy = Toy::new(2);
    let (params, aux) = toy.init(0);
    let step = TrainStep::compile(Sgd(0.1));
    let state = step.init_state(&params);
    let mut data = RandomState::from_seed(4).into_rng();

    let out = step
        .run(&toy, params, aux, state, &hparams(0.), &batch(&mut data, 8), RandomState::from_seed(0))
        .unwrap();

    assert!(matches!(out.aux.consistent(), Err(BenchErr::DivergedAuxState)));
    assert_ne!(out.aux.local(0), out.aux.local(1));

    let synced = sync_replicas(&out.aux).unwrap();
    assert!(synced.consistent().is_ok());
    assert_eq!(synced, sync_replicas(&synced).unwrap());
}

#[test]
fn state_from_another_step_is_rejected() {
    let toy = Toy::new(2);
    let (params, aux) = toy.init(0);
    let a = TrainStep::compile(Sgd(0.1));
    let b = TrainStep::compile(Sgd(0.1));
    let foreign = a.init_state(&params);
    let mut data = RandomState::from_seed(4).into_rng();

    let err = b
        .run(&toy, params, aux, foreign, &hparams(0.), &batch(&mut data, 8), RandomState::from_seed(0))
        .unwrap_err();

    assert!(matches!(err, BenchErr::UnpairedOptimizerState { .. }));
}

#[test]
fn batch_not_divisible_by_replicas_is_rejected() {
    let toy = Toy::new(3);
    let (params, aux) = toy.init(0);
    let step = TrainStep::compile(Sgd(0.1));
    let state = step.init_state(&params);
    let mut data = RandomState::from_seed(4).into_rng();

    let err = step
        .run(&toy, params, aux, state, &hparams(0.), &batch(&mut data, 8), RandomState::from_seed(0))
        .unwrap_err();

    assert!(matches!(
        err,
        BenchErr::BatchNotDivisible {
            batch_size: 8,
            replicas: 3
        }
    ));
}

#[test]
fn synced_exactly_at_epoch_boundaries() {
    let toy = Toy::new(2);
    let (mut params, mut aux) = toy.init(0);
    let step = TrainStep::compile(Sgd(0.1));
    let mut state = step.init_state(&params);
    let epochs = EpochSchedule::new(toy.num_train, 16).unwrap();
    let mut data = RandomState::from_seed(4).into_rng();
    let root = RandomState::from_seed(0);

    for global_step in 0..8 {
        let out = step
            .run(&toy, params, aux, state, &hparams(0.), &batch(&mut data, 16), root.fold_in(global_step as u64))
            .unwrap();

        aux = epochs.sync_at_boundary(global_step, out.aux).unwrap();
        assert_eq!(aux.is_synced(), (global_step + 1) % 4 == 0);
        (params, state) = (out.params, out.optimizer_state);
    }
}
