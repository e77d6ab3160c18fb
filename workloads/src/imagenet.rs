use std::{path::Path, sync::Arc, time::Duration};

use api::{
    AuxState, BenchErr, EvalSummary, ForwardPassMode, InitModel, LossType, ParameterTypeTree,
    Params, RandomState, ReplicaPool, Replicated, Result, ShapeTree, ShapeTuple, Split,
    TensorTree, VjpOutput, Workload, WorkloadProperties,
};
use log::{debug, info, warn};
use machine_learning::{
    Sequential,
    arch::{
        activations::output_activation,
        loss::{Loss, LossFn},
    },
};
use ndarray::{Array2, ArrayView1, ArrayView2};
use parking_lot::Mutex;

use crate::{
    config::WorkloadConfig,
    data::{DataSource, InMemoryDataset, InputQueue, Normalizer, SyntheticSource},
};

const TARGET_ACCURACY: f32 = 0.76;
const TRAIN_MEAN: [f32; 3] = [0.485 * 255., 0.456 * 255., 0.406 * 255.];
const TRAIN_STDDEV: [f32; 3] = [0.229 * 255., 0.224 * 255., 0.225 * 255.];

/// The phase of a workload whose model hasn't been built yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uninitialized;

/// The phase of a workload with a built model.
pub struct Ready {
    model: Sequential,
    output_layer: Option<String>,
    param_shapes: ShapeTree,
    param_types: ParameterTypeTree,
    loss: Loss,
    eval_dataset: Mutex<Option<Arc<InMemoryDataset>>>,
}

/// Image classification on ImageNet or its Imagenette subset.
///
/// The workload starts `Uninitialized` and turns `Ready` once its model is built, see
/// [`InitModel::init_model_fn`].
pub struct ImagenetWorkload<P = Uninitialized> {
    config: WorkloadConfig,
    pool: Arc<ReplicaPool>,
    source: Arc<dyn DataSource>,
    phase: P,
}

impl ImagenetWorkload<Uninitialized> {
    /// Creates a new `ImagenetWorkload`.
    ///
    /// # Arguments
    /// * `config` - The dataset, model and split sizes.
    /// * `pool` - The replicas every parallel step runs on.
    /// * `source` - Where the examples come from.
    ///
    /// # Returns
    /// A new workload or an error if the config is invalid.
    pub fn new(
        config: WorkloadConfig,
        pool: Arc<ReplicaPool>,
        source: Arc<dyn DataSource>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pool,
            source,
            phase: Uninitialized,
        })
    }

    /// Creates a workload reading synthetic images generated from `seed`.
    pub fn synthetic(config: WorkloadConfig, pool: Arc<ReplicaPool>, seed: u64) -> Result<Self> {
        let source = SyntheticSource::new(config.features(), config.dataset.num_classes(), seed);
        Self::new(config, pool, Arc::new(source))
    }
}

impl<P> ImagenetWorkload<P> {
    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    fn normalizer(&self) -> Normalizer {
        Normalizer::new(TRAIN_MEAN, TRAIN_STDDEV)
    }
}

impl ImagenetWorkload<Ready> {
    pub fn model(&self) -> &Sequential {
        &self.phase.model
    }

    /// Returns the evaluation split, loading it on first use.
    fn eval_dataset(&self, data_dir: &Path) -> Result<Arc<InMemoryDataset>> {
        let mut cached = self.phase.eval_dataset.lock();
        if let Some(dataset) = cached.as_ref() {
            return Ok(Arc::clone(dataset));
        }

        let dataset = Arc::new(self.source.load(
            Split::Test,
            data_dir,
            self.config.num_eval_examples(),
        )?);
        self.check_features(&dataset)?;

        info!(examples = dataset.len(); "cached evaluation split");
        *cached = Some(Arc::clone(&dataset));
        Ok(dataset)
    }

    fn check_features(&self, dataset: &InMemoryDataset) -> Result<()> {
        let expected = self.config.features();
        if dataset.features() != expected {
            return Err(BenchErr::DataSource(format!(
                "examples have {} features, the model reads {expected}",
                dataset.features()
            )));
        }
        Ok(())
    }
}

impl<P> WorkloadProperties for ImagenetWorkload<P> {
    fn name(&self) -> &str {
        self.config.dataset.name()
    }

    fn target_value(&self) -> f32 {
        TARGET_ACCURACY
    }

    fn loss_type(&self) -> LossType {
        LossType::SoftmaxCrossEntropy
    }

    fn train_mean(&self) -> [f32; 3] {
        TRAIN_MEAN
    }

    fn train_stddev(&self) -> [f32; 3] {
        TRAIN_STDDEV
    }

    fn num_train_examples(&self) -> usize {
        self.config.num_train_examples()
    }

    fn num_eval_examples(&self) -> usize {
        self.config.num_eval_examples()
    }

    fn num_classes(&self) -> usize {
        self.config.dataset.num_classes()
    }

    fn max_allowed_runtime(&self) -> Duration {
        self.config.dataset.max_allowed_runtime()
    }

    fn eval_period(&self) -> Duration {
        self.config.dataset.eval_period()
    }
}

impl InitModel for ImagenetWorkload<Uninitialized> {
    type Ready = ImagenetWorkload<Ready>;

    fn init_model_fn(self, rng: RandomState) -> Result<(Self::Ready, Params, AuxState)> {
        let features = self.config.features();
        let num_classes = self.num_classes();
        let model = self.config.model.build(features, num_classes);

        let mut rng = rng.into_rng();
        let (params, aux) = model.init(&mut rng)?;

        // one example of ones through the whole network
        let dummy = Array2::ones((1, features));
        let (logits, _) =
            model.forward(&params, &aux, dummy.view(), ForwardPassMode::Eval, false)?;
        if logits.dim() != (1, num_classes) {
            return Err(BenchErr::ShapeMismatch {
                what: "model output",
                path: "logits".into(),
                got: ShapeTuple::new([logits.nrows(), logits.ncols()]),
                expected: ShapeTuple::new([1, num_classes]),
            });
        }

        let param_shapes = params.shapes();
        params.check_shapes("initial parameters", &model.param_shapes())?;

        let replicas = self.pool.replicas();
        info!(
            workload = self.config.dataset.name(),
            model:? = self.config.model,
            params = params.numel(),
            replicas = replicas;
            "model initialized"
        );

        let phase = Ready {
            output_layer: model.output_layer().map(str::to_owned),
            param_types: model.param_types(),
            model,
            param_shapes,
            loss: Loss::from(self.loss_type()),
            eval_dataset: Mutex::new(None),
        };

        let ready = ImagenetWorkload {
            config: self.config,
            pool: self.pool,
            source: self.source,
            phase,
        };

        Ok((
            ready,
            Replicated::replicate(params, replicas),
            AuxState::replicate(aux, replicas),
        ))
    }
}

impl Workload for ImagenetWorkload<Ready> {
    type Queue = InputQueue;

    fn pool(&self) -> &ReplicaPool {
        &self.pool
    }

    fn param_shapes(&self) -> &ShapeTree {
        &self.phase.param_shapes
    }

    fn model_params_types(&self) -> ParameterTypeTree {
        self.phase.param_types.clone()
    }

    fn is_output_params(&self, path: &str) -> bool {
        self.phase
            .output_layer
            .as_deref()
            .and_then(|layer| path.strip_prefix(layer))
            .is_some_and(|rest| rest.starts_with('/'))
    }

    fn build_input_queue(
        &self,
        rng: RandomState,
        split: Split,
        data_dir: &Path,
        batch_size: usize,
    ) -> Result<InputQueue> {
        let replicas = self.pool.replicas();
        if batch_size % replicas != 0 {
            return Err(BenchErr::BatchNotDivisible {
                batch_size,
                replicas,
            });
        }

        let queue = match split {
            Split::Train => {
                let dataset =
                    self.source
                        .load(split, data_dir, self.config.num_train_examples())?;
                self.check_features(&dataset)?;
                InputQueue::shuffled(
                    Arc::new(dataset),
                    batch_size,
                    self.normalizer(),
                    rng.into_rng(),
                )?
            }
            Split::Test => {
                InputQueue::sequential(self.eval_dataset(data_dir)?, batch_size, self.normalizer())?
            }
        };

        debug!(split:? = split, batch_size = batch_size; "input queue built");
        Ok(queue)
    }

    fn model_fn(
        &self,
        params: &TensorTree,
        inputs: ArrayView2<f32>,
        aux: &TensorTree,
        mode: ForwardPassMode,
        _rng: RandomState,
        update_aux_state: bool,
    ) -> Result<(Array2<f32>, Option<TensorTree>)> {
        self.phase
            .model
            .forward(params, aux, inputs, mode, update_aux_state)
    }

    fn model_vjp(
        &self,
        params: &TensorTree,
        inputs: ArrayView2<f32>,
        aux: &TensorTree,
        _rng: RandomState,
        cotangent: &(dyn Fn(ArrayView2<f32>) -> Result<Array2<f32>> + Sync),
    ) -> Result<VjpOutput> {
        self.phase.model.vjp(params, aux, inputs, cotangent)
    }

    fn loss_fn(&self, labels: ArrayView1<u32>, logits: ArrayView2<f32>) -> Result<f32> {
        self.phase.loss.loss(logits, labels)
    }

    fn loss_grad(&self, labels: ArrayView1<u32>, logits: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.phase.loss.loss_prime(logits, labels)
    }

    fn output_activation_fn(&self, logits: ArrayView2<f32>, loss_type: LossType) -> Array2<f32> {
        output_activation(logits, loss_type)
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

        let batch_size = self.eval_batch_size();
        let batches = self.build_input_queue(data_rng, Split::Test, data_dir, batch_size)?;
        let num_batches = batches.batches_per_pass();
        if num_batches < self.num_eval_examples() / batch_size {
            warn!(
                declared = self.num_eval_examples(),
                batches = num_batches;
                "evaluation split is shorter than declared"
            );
        }

        let summary = engine::evaluate(self, params, &aux, batches, num_batches, model_rng)?;
        info!(
            workload = self.name(),
            accuracy = summary.accuracy,
            reached_goal = self.has_reached_goal(&summary);
            "evaluated"
        );
        Ok(summary)
    }
}
