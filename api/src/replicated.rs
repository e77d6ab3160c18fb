use crate::{BenchErr, Result, tree::TensorTree};

/// One copy of a value per replica.
///
/// The copies are indexed by replica id, the `i`-th copy lives with the `i`-th replica of the
/// pool for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct Replicated<T> {
    replicas: Vec<T>,
}

impl<T: Clone> Replicated<T> {
    /// Broadcasts `value` into `n` identical copies.
    pub fn replicate(value: T, n: usize) -> Self {
        Self {
            replicas: vec![value; n],
        }
    }
}

impl<T> Replicated<T> {
    /// Wraps one value per replica.
    pub fn from_replicas(replicas: Vec<T>) -> Self {
        Self { replicas }
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// The copy held by replica `i`.
    pub fn replica(&self, i: usize) -> &T {
        &self.replicas[i]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.replicas.iter()
    }

    /// Returns the first copy, the host view of a value known to be identical on every replica.
    pub fn unreplicate(&self) -> Option<&T> {
        self.replicas.first()
    }

    pub fn into_replicas(self) -> Vec<T> {
        self.replicas
    }

    /// Checks there's exactly one copy per replica.
    ///
    /// # Arguments
    /// * `what` - What the value represents, used in the error.
    /// * `replicas` - The amount of replicas in the pool.
    pub fn expect_replicas(&self, what: &'static str, replicas: usize) -> Result<()> {
        if self.replicas.len() != replicas {
            return Err(BenchErr::ReplicaCountMismatch {
                what,
                got: self.replicas.len(),
                expected: replicas,
            });
        }

        Ok(())
    }
}

impl<T: PartialEq> Replicated<T> {
    /// Whether every replica holds a bit-identical copy.
    pub fn is_consistent(&self) -> bool {
        self.replicas.windows(2).all(|w| w[0] == w[1])
    }
}

/// The replicated parameters of a model.
pub type Params = Replicated<TensorTree>;

/// Model state that isn't updated by gradients but evolves during the forward pass.
///
/// Each replica owns a local copy that may diverge from the others between two
/// synchronization points. Code outside a parallel step can only read the state through
/// [`AuxState::consistent`], which refuses to expose diverged copies.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxState {
    replicas: Replicated<TensorTree>,
    synced: bool,
}

impl AuxState {
    /// Broadcasts a single state to `n` replicas, the result is synchronized.
    pub fn replicate(state: TensorTree, n: usize) -> Self {
        Self {
            replicas: Replicated::replicate(state, n),
            synced: true,
        }
    }

    /// Wraps the copies each replica produced locally, the result is considered diverged.
    pub fn from_local(replicas: Vec<TensorTree>) -> Self {
        Self {
            replicas: Replicated::from_replicas(replicas),
            synced: false,
        }
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Whether the state went through a synchronization since the last local update.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// The replica-local copy of replica `i`.
    ///
    /// This is the step-facing accessor: only replica `i` may read it, from inside a parallel
    /// step or a reduction. Submissions, runners and evaluation must go through
    /// [`AuxState::consistent`] instead, the copies returned here may have diverged.
    pub fn local(&self, i: usize) -> &TensorTree {
        self.replicas.replica(i)
    }

    /// All the local copies, only to be consumed by a cross-replica reduction.
    ///
    /// Like [`AuxState::local`], this is reserved for the step and synchronization code.
    pub fn locals(&self) -> &[TensorTree] {
        &self.replicas.replicas
    }

    /// The state shared by every replica.
    ///
    /// # Returns
    /// A `DivergedAuxState` error if the replicas haven't been synchronized since their last
    /// local update.
    pub fn consistent(&self) -> Result<&TensorTree> {
        if !self.synced {
            return Err(BenchErr::DivergedAuxState);
        }

        self.replicas
            .unreplicate()
            .ok_or(BenchErr::ReplicaCountMismatch {
                what: "aux state",
                got: 0,
                expected: 1,
            })
    }

    pub fn expect_replicas(&self, replicas: usize) -> Result<()> {
        self.replicas.expect_replicas("aux state", replicas)
    }
}
