//! Execution of data-parallel steps over the replicas of a workload.

pub mod eval;
pub mod layout;
pub mod step;
pub mod sync;

pub use eval::{accuracy, evaluate};
pub use layout::{Placement, StepLayout};
pub use step::{ReplicatedState, StepOutput, TrainStep, add_weight_decay, weight_penalty};
pub use sync::{EpochSchedule, sync_replicas};
