use rand::{SeedableRng, rngs::StdRng};

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// An opaque, splittable source of randomness.
///
/// A `RandomState` isn't `Clone`. It's used up by splitting it or by turning it into a
/// generator, so every stream feeds exactly one consumer.
#[derive(Debug, PartialEq, Eq)]
pub struct RandomState {
    key: u64,
}

impl RandomState {
    /// Creates a new root `RandomState` from a seed.
    pub fn from_seed(seed: u64) -> Self {
        Self { key: mix(seed) }
    }

    /// Splits this state into `n` independent states.
    ///
    /// # Arguments
    /// * `n` - The amount of streams to derive.
    ///
    /// # Returns
    /// `n` states whose streams don't overlap with each other nor with the parent.
    pub fn split(self, n: usize) -> Vec<RandomState> {
        (0..n as u64).map(|i| self.child(i)).collect()
    }

    /// Splits this state into exactly two independent states.
    pub fn split2(self) -> (RandomState, RandomState) {
        (self.child(0), self.child(1))
    }

    /// Derives a new state keyed by `data` without consuming this one.
    ///
    /// Distinct `data` values produce independent streams, which makes this suitable for
    /// per-step randomness derived from a loop-wide state.
    pub fn fold_in(&self, data: u64) -> RandomState {
        Self {
            key: mix(self.key.rotate_left(17) ^ mix(data ^ GOLDEN_GAMMA)),
        }
    }

    fn child(&self, i: u64) -> RandomState {
        Self {
            key: mix(self.key ^ mix(i.wrapping_add(1).wrapping_mul(GOLDEN_GAMMA))),
        }
    }

    /// Turns this state into a random number generator.
    pub fn into_rng(self) -> StdRng {
        StdRng::seed_from_u64(self.key)
    }
}

/// The SplitMix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::Rng;

    use super::*;

    #[test]
    fn split_is_deterministic() {
        let a: Vec<_> = RandomState::from_seed(7).split(4);
        let b: Vec<_> = RandomState::from_seed(7).split(4);
        assert_eq!(a, b);
    }

    #[test]
    fn split_streams_are_distinct() {
        let keys: HashSet<u64> = RandomState::from_seed(0)
            .split(1000)
            .into_iter()
            .map(|s| s.key)
            .collect();

        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn fold_in_depends_on_data() {
        let root = RandomState::from_seed(3);
        assert_ne!(root.fold_in(0), root.fold_in(1));
        assert_eq!(root.fold_in(5), root.fold_in(5));
    }

    #[test]
    fn generators_from_split_states_differ() {
        let (a, b) = RandomState::from_seed(11).split2();
        let xa: u64 = a.into_rng().random();
        let xb: u64 = b.into_rng().random();
        assert_ne!(xa, xb);
    }
}
