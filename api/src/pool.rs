use std::{
    any::Any,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    thread,
};

use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};

use crate::{BenchErr, Result};

/// A fixed-size pool of compute replicas running in lock-step.
///
/// Every parallel call fans out one task per replica and returns only after all of them have
/// finished, so the caller observes each call as a single blocking SPMD step.
pub struct ReplicaPool {
    pool: ThreadPool,
    replicas: NonZeroUsize,
}

impl ReplicaPool {
    /// Creates a new `ReplicaPool`.
    ///
    /// # Arguments
    /// * `replicas` - The amount of replicas, fixed for the lifetime of the pool.
    ///
    /// # Returns
    /// A new `ReplicaPool` or an error if the worker threads couldn't be spawned.
    pub fn new(replicas: NonZeroUsize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(replicas.get())
            .thread_name(|i| format!("replica-{i}"))
            .build()
            .map_err(|e| BenchErr::InvalidConfig(format!("failed to build replica pool: {e}")))?;

        debug!(replicas = replicas.get(); "replica pool ready");
        Ok(Self { pool, replicas })
    }

    /// Creates a pool with one replica per available parallel compute unit.
    pub fn from_available_parallelism() -> Result<Self> {
        let replicas = thread::available_parallelism()?;
        Self::new(replicas)
    }

    pub fn replicas(&self) -> usize {
        self.replicas.get()
    }

    /// Runs `f` once per replica, in parallel, handing replica `i` its own input.
    ///
    /// # Arguments
    /// * `inputs` - The per-replica inputs, exactly one per replica.
    /// * `f` - The replica program, receives the replica id and its input.
    ///
    /// # Returns
    /// The outputs in replica order, the first error a replica returned, or a
    /// `ReplicaFailure` if a replica panicked.
    pub fn fan_out<I, T, F>(&self, inputs: Vec<I>, f: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(usize, I) -> Result<T> + Sync,
    {
        if inputs.len() != self.replicas() {
            return Err(BenchErr::ReplicaCountMismatch {
                what: "replica inputs",
                got: inputs.len(),
                expected: self.replicas(),
            });
        }

        self.pool.install(|| {
            inputs
                .into_par_iter()
                .enumerate()
                .map(|(i, input)| {
                    panic::catch_unwind(AssertUnwindSafe(|| f(i, input))).unwrap_or_else(
                        |payload| {
                            Err(BenchErr::ReplicaFailure {
                                replica: i,
                                detail: panic_message(payload),
                            })
                        },
                    )
                })
                .collect()
        })
    }

    /// Same as [`ReplicaPool::fan_out`] for replica programs that only need their id.
    pub fn run<T, F>(&self, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        self.fan_out(vec![(); self.replicas()], |i, ()| f(i))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return s.to_string();
    }

    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(_) => "replica panicked".to_string(),
    }
}
