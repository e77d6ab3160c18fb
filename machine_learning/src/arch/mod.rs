pub mod activations;
pub mod layers;
pub mod loss;
mod registry;
mod sequential;

pub use registry::ModelId;
pub use sequential::Sequential;
