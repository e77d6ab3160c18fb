mod batch_norm;
mod dense;
mod layer;
mod relu;

use api::{ParameterType, ShapeTuple};

use crate::initialization::Initializer;

pub use batch_norm::{BatchNorm, BatchNormCache};
pub use dense::Dense;
pub use layer::{Layer, LayerCache};
pub use relu::Relu;

/// The declaration of a parameter leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub path: String,
    pub shape: ShapeTuple,
    pub kind: ParameterType,
    pub init: Initializer,
}
