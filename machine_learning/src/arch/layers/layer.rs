use api::{BenchErr, Result, TensorTree};
use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{BatchNorm, BatchNormCache, Dense, ParamSpec, Relu};

pub enum Layer {
    Dense(Dense),
    BatchNorm(BatchNorm),
    Relu(Relu),
}

/// What a layer keeps from a train-mode forward pass to run its backward pass.
pub enum LayerCache {
    /// The input of the layer.
    Input(Array2<f32>),
    BatchNorm(BatchNormCache),
}

impl Layer {
    pub fn dense<S: Into<String>>(name: S, dim: (usize, usize)) -> Self {
        Self::Dense(Dense::new(name, dim))
    }

    pub fn batch_norm<S: Into<String>>(name: S, features: usize) -> Self {
        Self::BatchNorm(BatchNorm::new(name, features))
    }

    pub fn relu() -> Self {
        Self::Relu(Relu)
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        match self {
            Self::Dense(l) => l.param_specs(),
            Self::BatchNorm(l) => l.param_specs(),
            Self::Relu(_) => Vec::new(),
        }
    }

    pub fn init<R: Rng>(
        &self,
        rng: &mut R,
        params: &mut TensorTree,
        aux: &mut TensorTree,
    ) -> Result<()> {
        match self {
            Self::Dense(l) => l.init(rng, params),
            Self::BatchNorm(l) => l.init(rng, params, aux),
            Self::Relu(_) => Ok(()),
        }
    }

    pub fn forward_eval(
        &self,
        params: &TensorTree,
        aux: &TensorTree,
        x: ArrayView2<f32>,
    ) -> Result<Array2<f32>> {
        match self {
            Self::Dense(l) => l.forward(params, x),
            Self::BatchNorm(l) => l.forward_eval(params, aux, x),
            Self::Relu(l) => Ok(l.forward(x)),
        }
    }

    /// Makes a train-mode forward pass, writing updated auxiliary state into `new_aux` if given.
    pub fn forward_train(
        &self,
        params: &TensorTree,
        aux: &TensorTree,
        x: Array2<f32>,
        new_aux: Option<&mut TensorTree>,
    ) -> Result<(Array2<f32>, LayerCache)> {
        match self {
            Self::Dense(l) => Ok((l.forward(params, x.view())?, LayerCache::Input(x))),
            Self::BatchNorm(l) => {
                let (y, cache) = l.forward_train(params, aux, x.view(), new_aux)?;
                Ok((y, LayerCache::BatchNorm(cache)))
            }
            Self::Relu(l) => Ok((l.forward(x.view()), LayerCache::Input(x))),
        }
    }

    pub fn backward(
        &self,
        params: &TensorTree,
        cache: &LayerCache,
        d: Array2<f32>,
        grads: &mut TensorTree,
    ) -> Result<Array2<f32>> {
        match (self, cache) {
            (Self::Dense(l), LayerCache::Input(x)) => l.backward(params, x.view(), d.view(), grads),
            (Self::BatchNorm(l), LayerCache::BatchNorm(c)) => l.backward(params, c, d.view(), grads),
            (Self::Relu(l), LayerCache::Input(x)) => Ok(l.backward(x.view(), d.view())),
            _ => Err(BenchErr::InvalidConfig(
                "layer cache doesn't belong to the layer".into(),
            )),
        }
    }
}
