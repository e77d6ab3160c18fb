mod dataset;
mod normalize;
mod queue;
mod source;

pub use dataset::InMemoryDataset;
pub use normalize::Normalizer;
pub use queue::InputQueue;
pub use source::{DataSource, SyntheticSource};
