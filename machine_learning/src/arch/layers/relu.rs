use ndarray::{Array2, ArrayView2, Zip};

/// The rectified linear unit, applied element-wise.
#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

impl Relu {
    pub fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        x.mapv(|x| x.max(0.))
    }

    /// Pulls `d` back through the activation given the input `x` of the forward pass.
    pub fn backward(&self, x: ArrayView2<f32>, d: ArrayView2<f32>) -> Array2<f32> {
        Zip::from(&x)
            .and(&d)
            .map_collect(|&x, &d| if x > 0. { d } else { 0. })
    }
}
