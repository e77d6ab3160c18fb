use api::{BenchErr, ParameterType, Result, ShapeTuple, TensorTree};
use ndarray::{Ix1, Ix2, linalg, prelude::*};
use rand::Rng;

use super::ParamSpec;
use crate::initialization::Initializer;

/// A fully connected layer, `z = x w + b`.
#[derive(Debug, Clone)]
pub struct Dense {
    name: String,
    dim: (usize, usize),
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `name` - The scope of its parameters inside the parameter tree.
    /// * `dim` - The amount of input and output features.
    pub fn new<S: Into<String>>(name: S, dim: (usize, usize)) -> Self {
        Self {
            name: name.into(),
            dim,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    fn kernel_path(&self) -> String {
        format!("{}/kernel", self.name)
    }

    fn bias_path(&self) -> String {
        format!("{}/bias", self.name)
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec {
                path: self.kernel_path(),
                shape: ShapeTuple::new([self.dim.0, self.dim.1]),
                kind: ParameterType::Weight,
                init: Initializer::LecunNormal { fan_in: self.dim.0 },
            },
            ParamSpec {
                path: self.bias_path(),
                shape: ShapeTuple::new([self.dim.1]),
                kind: ParameterType::Bias,
                init: Initializer::Zeros,
            },
        ]
    }

    /// Writes freshly initialized parameters into `params`.
    pub fn init<R: Rng>(&self, rng: &mut R, params: &mut TensorTree) -> Result<()> {
        for spec in self.param_specs() {
            params.insert(spec.path, spec.init.init(rng, spec.shape.dims())?);
        }

        Ok(())
    }

    /// Makes a forward pass through the layer.
    ///
    /// # Arguments
    /// * `params` - The parameter tree holding this layer's kernel and bias.
    /// * `x` - The input, one example per row.
    ///
    /// # Returns
    /// The output of the layer or an error if a shape doesn't match.
    pub fn forward(&self, params: &TensorTree, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(x)?;
        let (w, b) = self.view_params(params)?;

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        Ok(z)
    }

    /// Pulls the output delta `d` back through the layer.
    ///
    /// # Arguments
    /// * `params` - The parameter tree holding this layer's kernel and bias.
    /// * `x` - The input of the forward pass.
    /// * `d` - The delta of the output.
    /// * `grads` - The gradient tree the kernel and bias deltas are written to.
    ///
    /// # Returns
    /// The delta of the input.
    pub fn backward(
        &self,
        params: &TensorTree,
        x: ArrayView2<f32>,
        d: ArrayView2<f32>,
        grads: &mut TensorTree,
    ) -> Result<Array2<f32>> {
        let (w, _) = self.view_params(params)?;

        let mut dw = Array2::zeros(self.dim);
        linalg::general_mat_mul(1.0, &x.t(), &d, 0.0, &mut dw);
        grads.insert(self.kernel_path(), dw.into_dyn());
        grads.insert(self.bias_path(), d.sum_axis(Axis(0)).into_dyn());

        let mut dx = Array2::zeros((d.nrows(), self.dim.0));
        linalg::general_mat_mul(1.0, &d, &w.t(), 0.0, &mut dx);

        Ok(dx)
    }

    fn check_input(&self, x: ArrayView2<f32>) -> Result<()> {
        if x.ncols() != self.dim.0 {
            return Err(BenchErr::ShapeMismatch {
                what: "dense input",
                path: self.name.clone(),
                got: ShapeTuple::new([x.nrows(), x.ncols()]),
                expected: ShapeTuple::new([x.nrows(), self.dim.0]),
            });
        }

        Ok(())
    }

    /// Gives a view of the parameter tree as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a TensorTree,
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let w = params
            .leaf("dense parameters", &self.kernel_path())?
            .view()
            .into_dimensionality::<Ix2>()?;
        let b = params
            .leaf("dense parameters", &self.bias_path())?
            .view()
            .into_dimensionality::<Ix1>()?;

        if w.dim() != self.dim || b.len() != self.dim.1 {
            return Err(BenchErr::ShapeMismatch {
                what: "dense parameters",
                path: self.kernel_path(),
                got: ShapeTuple::new(w.shape().iter().copied()),
                expected: ShapeTuple::new([self.dim.0, self.dim.1]),
            });
        }

        Ok((w, b))
    }
}
