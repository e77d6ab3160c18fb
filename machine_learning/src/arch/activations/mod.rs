mod output;

pub use output::{output_activation, sigmoid, softmax};
