use api::{BenchErr, Result};

/// How an argument of a parallel step reaches the replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Already resident on every replica, one copy each.
    Replicated,
    /// A single host value every replica reads.
    Broadcast,
    /// Split along its leading axis, one equal slice per replica.
    Partitioned,
}

/// The placement of every argument of a compiled step.
///
/// Built once when the step is compiled and reused unchanged for every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLayout {
    args: Vec<(&'static str, Placement)>,
}

impl StepLayout {
    /// Creates a new `StepLayout`.
    ///
    /// # Arguments
    /// * `args` - The name and placement of each argument, in call order.
    pub fn new(args: Vec<(&'static str, Placement)>) -> Self {
        Self { args }
    }

    /// The layout of a training step.
    pub fn train() -> Self {
        use Placement::*;

        Self::new(vec![
            ("params", Replicated),
            ("aux_state", Replicated),
            ("optimizer_state", Replicated),
            ("hyperparameters", Broadcast),
            ("batch", Partitioned),
            ("rng", Partitioned),
        ])
    }

    /// The layout of an evaluation forward pass.
    pub fn eval() -> Self {
        use Placement::*;

        Self::new(vec![
            ("params", Replicated),
            ("aux_state", Replicated),
            ("batch", Partitioned),
        ])
    }

    pub fn placement(&self, name: &str) -> Option<Placement> {
        self.args
            .iter()
            .find_map(|(arg, p)| (*arg == name).then_some(*p))
    }

    pub fn args(&self) -> &[(&'static str, Placement)] {
        &self.args
    }

    /// Checks the leading extent of every non broadcast argument against the pool.
    ///
    /// # Arguments
    /// * `replicas` - The amount of replicas.
    /// * `extents` - The name and leading extent of the arguments of one invocation.
    ///
    /// # Returns
    /// An error for the first argument whose extent doesn't fit its placement.
    pub fn validate(&self, replicas: usize, extents: &[(&'static str, usize)]) -> Result<()> {
        for &(name, placement) in &self.args {
            let Some(&(_, extent)) = extents.iter().find(|(arg, _)| *arg == name) else {
                continue;
            };

            match placement {
                Placement::Replicated if extent != replicas => {
                    return Err(BenchErr::ReplicaCountMismatch {
                        what: name,
                        got: extent,
                        expected: replicas,
                    });
                }
                Placement::Partitioned if replicas == 0 || extent % replicas != 0 => {
                    return Err(BenchErr::BatchNotDivisible {
                        batch_size: extent,
                        replicas,
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}
