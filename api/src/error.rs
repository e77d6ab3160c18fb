use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use crate::tree::ShapeTuple;

/// The result type used across the benchmark crates.
pub type Result<T> = std::result::Result<T, BenchErr>;

/// Every failure the benchmark core can report.
///
/// None of these are recoverable inside the core, they all propagate to the driver which
/// decides whether to abort the run or mark the submission as failed.
#[derive(Debug)]
pub enum BenchErr {
    /// The batch can't be partitioned evenly across the replicas.
    BatchNotDivisible { batch_size: usize, replicas: usize },
    /// A configuration value or hyperparameter is out of its domain.
    InvalidConfig(String),
    /// Two trees don't have the same set of leaves.
    TreeMismatch { what: &'static str, path: String },
    /// A leaf has a different shape than the one it was declared with.
    ShapeMismatch {
        what: &'static str,
        path: String,
        got: ShapeTuple,
        expected: ShapeTuple,
    },
    /// A replicated value doesn't hold one copy per replica.
    ReplicaCountMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// An optimizer state was handed to an update function it wasn't created by.
    UnpairedOptimizerState { expected: u64, got: u64 },
    /// Auxiliary state was read while the replicas had diverged.
    DivergedAuxState,
    /// A replica panicked during a parallel step.
    ReplicaFailure { replica: usize, detail: String },
    /// A label doesn't index any of the model's classes.
    LabelOutOfRange { label: u32, classes: usize },
    /// An input queue stopped yielding batches.
    InputExhausted { what: &'static str },
    /// The data source couldn't produce the requested split.
    DataSource(String),
    Json(serde_json::Error),
    Io(io::Error),
}

impl Display for BenchErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchErr::BatchNotDivisible {
                batch_size,
                replicas,
            } => write!(
                f,
                "batch size {batch_size} must be divisible by the number of replicas ({replicas})"
            ),
            BenchErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            BenchErr::TreeMismatch { what, path } => {
                write!(f, "tree mismatch for {what}: leaf `{path}` is missing")
            }
            BenchErr::ShapeMismatch {
                what,
                path,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for {what} at `{path}`: got {got}, expected {expected}"
            ),
            BenchErr::ReplicaCountMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "{what} holds {got} replicas but the pool runs {expected}"
            ),
            BenchErr::UnpairedOptimizerState { expected, got } => write!(
                f,
                "optimizer state was created by transformation #{got}, it can't be updated by #{expected}"
            ),
            BenchErr::DivergedAuxState => {
                f.write_str("auxiliary state was read while the replicas are out of sync")
            }
            BenchErr::ReplicaFailure { replica, detail } => {
                write!(f, "replica {replica} failed: {detail}")
            }
            BenchErr::LabelOutOfRange { label, classes } => {
                write!(f, "label {label} is out of range for {classes} classes")
            }
            BenchErr::InputExhausted { what } => write!(f, "{what} ran out of batches"),
            BenchErr::DataSource(msg) => write!(f, "data source error: {msg}"),
            BenchErr::Json(e) => write!(f, "json error: {e}"),
            BenchErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for BenchErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BenchErr::Json(e) => Some(e),
            BenchErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BenchErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for BenchErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<ndarray::ShapeError> for BenchErr {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::InvalidConfig(value.to_string())
    }
}
