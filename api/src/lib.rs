//! The contract between workloads and submissions.
//!
//! Workloads own the model, data and evaluation protocol. Submissions own the optimizer.
//! Both meet over the value types defined here, which replicate state across a fixed pool of
//! compute replicas.

pub mod batch;
pub mod config;
mod error;
pub mod pool;
pub mod reduce;
pub mod replicated;
pub mod rng;
pub mod submission;
pub mod tree;
pub mod workload;

pub use batch::{Batch, BatchShard};
pub use config::{ForwardPassMode, Hyperparameters, LossType, ParameterType, ParameterTypeTree, Split};
pub use error::{BenchErr, Result};
pub use pool::ReplicaPool;
pub use reduce::{Mean, pmean};
pub use replicated::{AuxState, Params, Replicated};
pub use rng::RandomState;
pub use submission::{GradientTransformation, OptimizerState, Paired, PairingTag, Submission};
pub use tree::{ShapeTree, ShapeTuple, TensorTree};
pub use workload::{
    BatchMetrics, EVAL_BATCH_SIZE, EvalSummary, InitModel, VjpOutput, Workload,
    WorkloadProperties,
};
