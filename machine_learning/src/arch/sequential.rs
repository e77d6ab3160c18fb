use api::{
    BenchErr, ForwardPassMode, ParameterTypeTree, Result, ShapeTree, ShapeTuple, TensorTree,
    VjpOutput,
};
use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::layers::{Layer, ParamSpec};

/// A sequential model: information flows forward when computing an output and backward when
/// pulling a cotangent back to the parameters.
///
/// The model itself is stateless, parameters and auxiliary state live in `TensorTree`s that are
/// passed in on every call.
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn param_specs(&self) -> impl Iterator<Item = ParamSpec> + '_ {
        self.layers.iter().flat_map(Layer::param_specs)
    }

    /// The declared shape of every parameter leaf.
    pub fn param_shapes(&self) -> ShapeTree {
        self.param_specs().map(|s| (s.path, s.shape)).collect()
    }

    /// The role of every parameter leaf.
    pub fn param_types(&self) -> ParameterTypeTree {
        self.param_specs().map(|s| (s.path, s.kind)).collect()
    }

    /// The name of the last layer holding parameters.
    pub fn output_layer(&self) -> Option<&str> {
        self.layers.iter().rev().find_map(|l| match l {
            Layer::Dense(d) => Some(d.name()),
            Layer::BatchNorm(b) => Some(b.name()),
            Layer::Relu(_) => None,
        })
    }

    /// Initializes the parameters and the auxiliary state.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    ///
    /// # Returns
    /// The parameter tree and the auxiliary state tree.
    pub fn init<R: Rng>(&self, rng: &mut R) -> Result<(TensorTree, TensorTree)> {
        let mut params = TensorTree::new();
        let mut aux = TensorTree::new();

        for layer in &self.layers {
            layer.init(rng, &mut params, &mut aux)?;
        }

        Ok((params, aux))
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The parameter tree.
    /// * `aux` - The auxiliary state tree.
    /// * `x` - The input data.
    /// * `mode` - Train mode normalizes with batch statistics, eval mode with running ones.
    /// * `update_aux` - Whether to return the updated auxiliary state, train mode only.
    ///
    /// # Returns
    /// The logits and, if requested, the new auxiliary state.
    pub fn forward(
        &self,
        params: &TensorTree,
        aux: &TensorTree,
        x: ArrayView2<f32>,
        mode: ForwardPassMode,
        update_aux: bool,
    ) -> Result<(Array2<f32>, Option<TensorTree>)> {
        match mode {
            ForwardPassMode::Eval => {
                let mut y = x.to_owned();
                for layer in &self.layers {
                    y = layer.forward_eval(params, aux, y.view())?;
                }
                Ok((y, None))
            }
            ForwardPassMode::Train => {
                let mut new_aux = update_aux.then(|| aux.clone());
                let mut y = x.to_owned();
                for layer in &self.layers {
                    (y, _) = layer.forward_train(params, aux, y, new_aux.as_mut())?;
                }
                Ok((y, new_aux))
            }
        }
    }

    /// Makes a train-mode forward pass and pulls `cotangent(logits)` back to the parameters.
    ///
    /// # Arguments
    /// * `params` - The parameter tree.
    /// * `aux` - The auxiliary state tree.
    /// * `x` - The input data.
    /// * `cotangent` - Maps the logits to the delta of the output.
    ///
    /// # Returns
    /// The logits, the updated auxiliary state and the gradient of every parameter leaf.
    pub fn vjp(
        &self,
        params: &TensorTree,
        aux: &TensorTree,
        x: ArrayView2<f32>,
        cotangent: &(dyn Fn(ArrayView2<f32>) -> Result<Array2<f32>> + Sync),
    ) -> Result<VjpOutput> {
        let mut new_aux = aux.clone();
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut y = x.to_owned();

        for layer in &self.layers {
            let (out, cache) = layer.forward_train(params, aux, y, Some(&mut new_aux))?;
            caches.push(cache);
            y = out;
        }

        let mut d = cotangent(y.view())?;
        if d.dim() != y.dim() {
            return Err(BenchErr::ShapeMismatch {
                what: "cotangent",
                path: "logits".into(),
                got: ShapeTuple::new([d.nrows(), d.ncols()]),
                expected: ShapeTuple::new([y.nrows(), y.ncols()]),
            });
        }

        let mut grads = TensorTree::new();
        for (layer, cache) in self.layers.iter().zip(&caches).rev() {
            d = layer.backward(params, cache, d, &mut grads)?;
        }

        Ok(VjpOutput {
            logits: y,
            aux: new_aux,
            grads,
        })
    }
}
