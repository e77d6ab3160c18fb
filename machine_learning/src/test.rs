#![cfg(test)]

use api::{ForwardPassMode, TensorTree};
use ndarray::{Array2, ArrayView2, arr1};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    ModelId, Sequential,
    arch::loss::{LossFn, SoftmaxCrossEntropy},
};

fn inputs(rng: &mut StdRng, n: usize, features: usize) -> Array2<f32> {
    Array2::from_shape_fn((n, features), |_| rng.random_range(-1.0..1.0))
}

fn loss(model: &Sequential, params: &TensorTree, aux: &TensorTree, x: ArrayView2<f32>) -> f32 {
    let labels = arr1(&[0, 2, 1, 2, 0, 1]);
    let (logits, _) = model
        .forward(params, aux, x, ForwardPassMode::Train, false)
        .unwrap();
    SoftmaxCrossEntropy.loss(logits.view(), labels.view()).unwrap()
}

/// Compares the pulled back gradient of every parameter against central finite differences.
fn check_vjp(id: ModelId) {
    let mut rng = StdRng::seed_from_u64(17);
    let model = id.build(4, 3);
    let (params, aux) = model.init(&mut rng).unwrap();
    let x = inputs(&mut rng, 6, 4);
    let labels = arr1(&[0, 2, 1, 2, 0, 1]);

    let out = model
        .vjp(&params, &aux, x.view(), &|logits| {
            SoftmaxCrossEntropy.loss_prime(logits, labels.view())
        })
        .unwrap();

    assert_eq!(out.grads.shapes(), model.param_shapes());

    let h = 1e-3;
    for (path, grad) in out.grads.iter() {
        for (idx, &g) in grad.indexed_iter() {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus.insert(path.clone(), {
                let mut t = params.get(path).unwrap().clone();
                t[&idx] += h;
                t
            });
            minus.insert(path.clone(), {
                let mut t = params.get(path).unwrap().clone();
                t[&idx] -= h;
                t
            });

            let numeric = (loss(&model, &plus, &aux, x.view())
                - loss(&model, &minus, &aux, x.view()))
                / (2. * h);
            assert!(
                (numeric - g).abs() < 2e-3,
                "{path}{idx:?}: numeric {numeric} vs analytic {g}"
            );
        }
    }
}

#[test]
fn linear_vjp_matches_finite_differences() {
    check_vjp(ModelId::Linear);
}

#[test]
fn bn_mlp_vjp_matches_finite_differences() {
    check_vjp(ModelId::BnMlpSmall);
}

#[test]
fn train_forward_updates_running_statistics() {
    let mut rng = StdRng::seed_from_u64(3);
    let model = ModelId::BnMlpSmall.build(4, 3);
    let (params, aux) = model.init(&mut rng).unwrap();
    let x = inputs(&mut rng, 8, 4);

    let (_, new_aux) = model
        .forward(&params, &aux, x.view(), ForwardPassMode::Train, true)
        .unwrap();
    let new_aux = new_aux.unwrap();

    assert_eq!(new_aux.shapes(), aux.shapes());
    assert_ne!(new_aux, aux);

    // eval mode never touches the auxiliary state
    let (_, none) = model
        .forward(&params, &aux, x.view(), ForwardPassMode::Eval, true)
        .unwrap();
    assert!(none.is_none());
}

#[test]
fn eval_forward_uses_running_statistics() {
    let mut rng = StdRng::seed_from_u64(5);
    let model = ModelId::BnMlpSmall.build(4, 3);
    let (params, aux) = model.init(&mut rng).unwrap();
    let x = inputs(&mut rng, 8, 4);

    // a single example through eval mode gives the same logits alone or inside the batch
    let (batch, _) = model
        .forward(&params, &aux, x.view(), ForwardPassMode::Eval, false)
        .unwrap();
    let (single, _) = model
        .forward(&params, &aux, x.slice(ndarray::s![..1, ..]), ForwardPassMode::Eval, false)
        .unwrap();

    for (a, b) in batch.row(0).iter().zip(single.row(0)) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn wrong_input_width_is_an_error() {
    let mut rng = StdRng::seed_from_u64(0);
    let model = ModelId::Linear.build(4, 3);
    let (params, aux) = model.init(&mut rng).unwrap();
    let x = inputs(&mut rng, 2, 5);

    assert!(
        model
            .forward(&params, &aux, x.view(), ForwardPassMode::Eval, false)
            .is_err()
    );
}
