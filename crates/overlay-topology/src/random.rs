//! Randomness strategies used by the repair algorithm.
//!
//! The topology never touches a global random source. Every random decision
//! goes through a [`Randomness`] implementation owned by the topology, so
//! tests can swap in [`Deterministic`] and assert exact resulting graphs.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Source of the two random decisions made while repairing an overlay.
pub trait Randomness {
    /// Reorder `items` in place.
    fn shuffle<T>(&mut self, items: &mut [T]);

    /// Pick one element of `items`, or `None` if it is empty.
    fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T>;
}

/// Uniform shuffling and picking backed by [`StdRng`].
#[derive(Debug, Clone)]
pub struct UniformRandom {
    rng: StdRng,
}

impl UniformRandom {
    /// Seed from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seed deterministically, for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for UniformRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl Randomness for UniformRandom {
    fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }
}

/// Identity shuffle and first-element pick.
///
/// Combined with the ordered storage of the topology this makes every
/// repair fully predictable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deterministic;

impl Randomness for Deterministic {
    fn shuffle<T>(&mut self, _items: &mut [T]) {}

    fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.first()
    }
}
