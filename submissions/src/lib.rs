//! Reference training algorithms.

pub mod nesterov;

pub use nesterov::{NesterovState, NesterovSubmission};
