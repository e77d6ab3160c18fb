#![allow(dead_code)]

use std::{
    iter::{Cycle, Map},
    num::NonZeroUsize,
    path::Path,
    time::Duration,
    vec,
};

use api::{
    AuxState, Batch, EvalSummary, ForwardPassMode, GradientTransformation, LossType,
    ParameterType, ParameterTypeTree, Params, RandomState, ReplicaPool, Replicated, Result,
    ShapeTree, ShapeTuple, Split, TensorTree, VjpOutput, Workload, WorkloadProperties,
};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Ix1, Ix2};
use rand::Rng;

pub const FEATURES: usize = 3;
pub const CLASSES: usize = 2;

/// A linear classifier whose auxiliary state tracks the running mean of its inputs.
pub struct Toy {
    pool: ReplicaPool,
    shapes: ShapeTree,
    pub num_train: usize,
    pub num_eval: usize,
}

impl Toy {
    pub fn new(replicas: usize) -> Self {
        let mut shapes = ShapeTree::new();
        shapes.insert("dense/kernel".into(), ShapeTuple::new([FEATURES, CLASSES]));
        shapes.insert("dense/bias".into(), ShapeTuple::new([CLASSES]));

        Self {
            pool: ReplicaPool::new(NonZeroUsize::new(replicas).unwrap()).unwrap(),
            shapes,
            num_train: 64,
            num_eval: 1000,
        }
    }

    pub fn init(&self, seed: u64) -> (Params, AuxState) {
        let mut rng = RandomState::from_seed(seed).into_rng();
        let mut params = TensorTree::zeros(&self.shapes);
        params.insert(
            "dense/kernel",
            Array2::from_shape_fn((FEATURES, CLASSES), |_| rng.random_range(-0.5..0.5)).into_dyn(),
        );

        let mut aux = TensorTree::new();
        aux.insert("stats/mean", Array1::<f32>::zeros(FEATURES).into_dyn());

        let r = self.pool.replicas();
        (Replicated::replicate(params, r), AuxState::replicate(aux, r))
    }

    fn logits(&self, params: &TensorTree, inputs: ArrayView2<f32>) -> Array2<f32> {
        let w = params.get("dense/kernel").unwrap().view().into_dimensionality::<Ix2>().unwrap();
        let b = params.get("dense/bias").unwrap().view().into_dimensionality::<Ix1>().unwrap();
        inputs.dot(&w) + &b
    }

    fn updated_aux(aux: &TensorTree, inputs: ArrayView2<f32>) -> TensorTree {
        let old = aux.get("stats/mean").unwrap();
        let mean = inputs.mean_axis(Axis(0)).unwrap().into_dyn();
        let mut out = TensorTree::new();
        out.insert("stats/mean", old * 0.9 + mean * 0.1);
        out
    }
}

/// Samples a batch whose label is the sign of the first feature.
pub fn batch(rng: &mut impl Rng, n: usize) -> Batch {
    let inputs = Array2::from_shape_fn((n, FEATURES), |_| rng.random_range(-1.0..1.0_f32));
    let labels = inputs.column(0).mapv(|x| u32::from(x > 0.));
    Batch::new(inputs, labels).unwrap()
}

fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut out = logits.to_owned();
    for mut row in out.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    out
}

impl WorkloadProperties for Toy {
    fn name(&self) -> &str {
        "toy"
    }

    fn target_value(&self) -> f32 {
        0.9
    }

    fn loss_type(&self) -> LossType {
        LossType::SoftmaxCrossEntropy
    }

    fn train_mean(&self) -> [f32; 3] {
        [0.; 3]
    }

    fn train_stddev(&self) -> [f32; 3] {
        [1.; 3]
    }

    fn num_train_examples(&self) -> usize {
        self.num_train
    }

    fn num_eval_examples(&self) -> usize {
        self.num_eval
    }

    fn num_classes(&self) -> usize {
        CLASSES
    }

    fn max_allowed_runtime(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn eval_period(&self) -> Duration {
        Duration::from_secs(1)
    }
}

impl Workload for Toy {
    type Queue = Map<Cycle<vec::IntoIter<Batch>>, fn(Batch) -> Result<Batch>>;

    fn pool(&self) -> &ReplicaPool {
        &self.pool
    }

    fn param_shapes(&self) -> &ShapeTree {
        &self.shapes
    }

    fn model_params_types(&self) -> ParameterTypeTree {
        self.shapes
            .iter()
            .map(|(p, s)| {
                let t = if s.rank() > 1 {
                    ParameterType::Weight
                } else {
                    ParameterType::Bias
                };
                (p.clone(), t)
            })
            .collect()
    }

    fn is_output_params(&self, _: &str) -> bool {
        true
    }

    fn build_input_queue(
        &self,
        rng: RandomState,
        _: Split,
        _: &Path,
        batch_size: usize,
    ) -> Result<Self::Queue> {
        let mut rng = rng.into_rng();
        let batches: Vec<_> = (0..8).map(|_| batch(&mut rng, batch_size)).collect();
        Ok(batches.into_iter().cycle().map(Ok as fn(Batch) -> Result<Batch>))
    }

    fn model_fn(
        &self,
        params: &TensorTree,
        inputs: ArrayView2<f32>,
        aux: &TensorTree,
        mode: ForwardPassMode,
        _: RandomState,
        update_aux_state: bool,
    ) -> Result<(Array2<f32>, Option<TensorTree>)> {
        let logits = self.logits(params, inputs);
        let aux = (mode == ForwardPassMode::Train && update_aux_state)
            .then(|| Self::updated_aux(aux, inputs));
        Ok((logits, aux))
    }

    fn model_vjp(
        &self,
        params: &TensorTree,
        inputs: ArrayView2<f32>,
        aux: &TensorTree,
        _: RandomState,
        cotangent: &(dyn Fn(ArrayView2<f32>) -> Result<Array2<f32>> + Sync),
    ) -> Result<VjpOutput> {
        let logits = self.logits(params, inputs);
        let dz = cotangent(logits.view())?;

        let mut grads = TensorTree::new();
        grads.insert("dense/kernel", inputs.t().dot(&dz).into_dyn());
        grads.insert("dense/bias", dz.sum_axis(Axis(0)).into_dyn());

        Ok(VjpOutput {
            logits,
            aux: Self::updated_aux(aux, inputs),
            grads,
        })
    }

    fn loss_fn(&self, labels: ArrayView1<u32>, logits: ArrayView2<f32>) -> Result<f32> {
        let probs = softmax(logits);
        let total: f32 = labels
            .iter()
            .enumerate()
            .map(|(i, &y)| -probs[[i, y as usize]].max(1e-12).ln())
            .sum();
        Ok(total / labels.len() as f32)
    }

    fn loss_grad(&self, labels: ArrayView1<u32>, logits: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut g = softmax(logits);
        for (i, &y) in labels.iter().enumerate() {
            g[[i, y as usize]] -= 1.;
        }
        Ok(g / labels.len() as f32)
    }

    fn output_activation_fn(&self, logits: ArrayView2<f32>, _: LossType) -> Array2<f32> {
        softmax(logits)
    }

    fn sync_batch_stats(&self, aux: &AuxState) -> Result<AuxState> {
        engine::sync_replicas(aux)
    }

    fn eval_model(
        &self,
        params: &Params,
        aux: &AuxState,
        rng: RandomState,
        data_dir: &Path,
    ) -> Result<EvalSummary> {
        let aux = self.sync_batch_stats(aux)?;
        let (data_rng, model_rng) = rng.split2();
        let batches = self.build_input_queue(data_rng, Split::Test, data_dir, 200)?;
        engine::evaluate(self, params, &aux, batches, self.num_eval / 200, model_rng)
    }
}

/// Plain gradient descent.
pub struct Sgd(pub f32);

impl GradientTransformation for Sgd {
    type State = ();

    fn init(&self, _: &TensorTree) {}

    fn update(&self, grads: &TensorTree, _: &(), _: &TensorTree) -> Result<(TensorTree, ())> {
        Ok((grads.scale(-self.0), ()))
    }
}
