mod error;
mod initializer;

pub use error::RandErr;
pub use initializer::Initializer;
