//! The ImageNet workload and its input pipeline.

pub mod config;
pub mod data;
pub mod imagenet;

pub use config::{DatasetId, WorkloadConfig};
pub use imagenet::{ImagenetWorkload, Ready, Uninitialized};
