use api::{BenchErr, ParameterType, Result, ShapeTuple, TensorTree};
use ndarray::{Ix1, prelude::*};
use rand::Rng;

use super::ParamSpec;
use crate::initialization::Initializer;

/// What the backward pass of a `BatchNorm` needs from its forward pass.
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    xhat: Array2<f32>,
    inv_std: Array1<f32>,
}

/// Batch normalization over the feature axis.
///
/// In train mode the batch statistics normalize the input and are folded into the running
/// statistics, in eval mode the running statistics are used instead.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    name: String,
    features: usize,
    momentum: f32,
    epsilon: f32,
}

impl BatchNorm {
    pub const MOMENTUM: f32 = 0.9;
    pub const EPSILON: f32 = 1e-5;

    pub fn new<S: Into<String>>(name: S, features: usize) -> Self {
        Self {
            name: name.into(),
            features,
            momentum: Self::MOMENTUM,
            epsilon: Self::EPSILON,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn scale_path(&self) -> String {
        format!("{}/scale", self.name)
    }

    fn bias_path(&self) -> String {
        format!("{}/bias", self.name)
    }

    fn mean_path(&self) -> String {
        format!("batch_stats/{}/mean", self.name)
    }

    fn var_path(&self) -> String {
        format!("batch_stats/{}/var", self.name)
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec {
                path: self.scale_path(),
                shape: ShapeTuple::new([self.features]),
                kind: ParameterType::BatchNormScale,
                init: Initializer::Ones,
            },
            ParamSpec {
                path: self.bias_path(),
                shape: ShapeTuple::new([self.features]),
                kind: ParameterType::BatchNormBias,
                init: Initializer::Zeros,
            },
        ]
    }

    /// Writes freshly initialized parameters and running statistics.
    pub fn init<R: Rng>(
        &self,
        rng: &mut R,
        params: &mut TensorTree,
        aux: &mut TensorTree,
    ) -> Result<()> {
        for spec in self.param_specs() {
            params.insert(spec.path, spec.init.init(rng, spec.shape.dims())?);
        }

        aux.insert(self.mean_path(), ArrayD::zeros(IxDyn(&[self.features])));
        aux.insert(self.var_path(), ArrayD::ones(IxDyn(&[self.features])));
        Ok(())
    }

    /// Normalizes `x` with the running statistics.
    pub fn forward_eval(
        &self,
        params: &TensorTree,
        aux: &TensorTree,
        x: ArrayView2<f32>,
    ) -> Result<Array2<f32>> {
        self.check_input(x)?;
        let (scale, bias) = self.view_params(params)?;
        let mean = self.view_leaf(aux, "batch norm statistics", self.mean_path())?;
        let var = self.view_leaf(aux, "batch norm statistics", self.var_path())?;

        let inv_std = var.mapv(|v| 1. / (v + self.epsilon).sqrt());
        Ok((&x - &mean) * &inv_std * &scale + &bias)
    }

    /// Normalizes `x` with its own statistics.
    ///
    /// # Arguments
    /// * `params` - The parameter tree holding the scale and bias.
    /// * `aux` - The auxiliary state holding the running statistics.
    /// * `x` - The input, one example per row.
    /// * `new_aux` - If given, receives the updated running statistics.
    ///
    /// # Returns
    /// The normalized output and the cache of the backward pass.
    pub fn forward_train(
        &self,
        params: &TensorTree,
        aux: &TensorTree,
        x: ArrayView2<f32>,
        new_aux: Option<&mut TensorTree>,
    ) -> Result<(Array2<f32>, BatchNormCache)> {
        self.check_input(x)?;
        let (scale, bias) = self.view_params(params)?;

        let empty = || BenchErr::InvalidConfig(format!("{} got an empty batch", self.name));
        let mean = x.mean_axis(Axis(0)).ok_or_else(empty)?;
        let centered = &x - &mean;
        let var = centered.mapv(|c| c * c).mean_axis(Axis(0)).ok_or_else(empty)?;
        let inv_std = var.mapv(|v| 1. / (v + self.epsilon).sqrt());

        let xhat = centered * &inv_std;
        let y = &xhat * &scale + &bias;

        if let Some(new_aux) = new_aux {
            let m = self.momentum;
            let ra_mean = self.view_leaf(aux, "batch norm statistics", self.mean_path())?;
            let ra_var = self.view_leaf(aux, "batch norm statistics", self.var_path())?;
            new_aux.insert(self.mean_path(), (&ra_mean * m + &mean * (1. - m)).into_dyn());
            new_aux.insert(self.var_path(), (&ra_var * m + &var * (1. - m)).into_dyn());
        }

        Ok((y, BatchNormCache { xhat, inv_std }))
    }

    /// Pulls the output delta `d` back through the layer.
    ///
    /// # Arguments
    /// * `params` - The parameter tree holding the scale and bias.
    /// * `cache` - What the train-mode forward pass left behind.
    /// * `d` - The delta of the output.
    /// * `grads` - The gradient tree the scale and bias deltas are written to.
    ///
    /// # Returns
    /// The delta of the input.
    pub fn backward(
        &self,
        params: &TensorTree,
        cache: &BatchNormCache,
        d: ArrayView2<f32>,
        grads: &mut TensorTree,
    ) -> Result<Array2<f32>> {
        let (scale, _) = self.view_params(params)?;
        let BatchNormCache { xhat, inv_std } = cache;
        let n = d.nrows() as f32;

        grads.insert(self.scale_path(), (&d * xhat).sum_axis(Axis(0)).into_dyn());
        grads.insert(self.bias_path(), d.sum_axis(Axis(0)).into_dyn());

        let dxhat = &d * &scale;
        let sum_dxhat = dxhat.sum_axis(Axis(0));
        let sum_dxhat_xhat = (&dxhat * xhat).sum_axis(Axis(0));

        let dx = (dxhat * n - &sum_dxhat - xhat * &sum_dxhat_xhat) * &(inv_std / n);
        Ok(dx)
    }

    fn check_input(&self, x: ArrayView2<f32>) -> Result<()> {
        if x.ncols() != self.features {
            return Err(BenchErr::ShapeMismatch {
                what: "batch norm input",
                path: self.name.clone(),
                got: ShapeTuple::new([x.nrows(), x.ncols()]),
                expected: ShapeTuple::new([x.nrows(), self.features]),
            });
        }

        Ok(())
    }

    fn view_params<'a>(
        &self,
        params: &'a TensorTree,
    ) -> Result<(ArrayView1<'a, f32>, ArrayView1<'a, f32>)> {
        let scale = self.view_leaf(params, "batch norm parameters", self.scale_path())?;
        let bias = self.view_leaf(params, "batch norm parameters", self.bias_path())?;
        Ok((scale, bias))
    }

    fn view_leaf<'a>(
        &self,
        tree: &'a TensorTree,
        what: &'static str,
        path: String,
    ) -> Result<ArrayView1<'a, f32>> {
        let leaf = tree.leaf(what, &path)?.view().into_dimensionality::<Ix1>()?;
        if leaf.len() != self.features {
            return Err(BenchErr::ShapeMismatch {
                what,
                path,
                got: ShapeTuple::new([leaf.len()]),
                expected: ShapeTuple::new([self.features]),
            });
        }

        Ok(leaf)
    }
}
