//! Fixture value generation.
//!
//! Scenarios never draw random values directly; they ask the runner's
//! [`ValueGenerator`], so a run is reproducible from its seed.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Lowest id handed out by [`ValueGenerator::absent_id`].
const ABSENT_ID_MIN: i64 = 10_000;
/// Upper bound (exclusive) of ids handed out by [`ValueGenerator::absent_id`].
const ABSENT_ID_MAX: i64 = 100_000;
const ABSENT_ID_ATTEMPTS: usize = 64;

const DISHES: &[&str] = &[
    "Pasta Carbonara",
    "Borscht",
    "Pelmeni",
    "Caesar Salad",
    "Ramen",
    "Paella",
    "Moussaka",
    "Pad Thai",
    "Goulash",
    "Risotto",
    "Falafel",
    "Shakshuka",
];

const CATEGORY_NAMES: &[&str] = &[
    "Aardvark", "Badger", "Caracal", "Dingo", "Echidna", "Ferret", "Gecko", "Heron", "Ibis",
    "Jackal", "Koala", "Lemur",
];

/// Source of fixture values.
pub trait ValueGenerator {
    /// Title for a new product.
    fn product_title(&mut self) -> String;

    /// Positive price for a new product.
    fn price(&mut self) -> i64;

    /// Title for a fixture category. Uniqueness against the store is the
    /// oracle's concern.
    fn category_title(&mut self) -> String;

    /// A positive id not contained in `taken`.
    fn absent_id(&mut self, taken: &[i64]) -> i64;

    /// Seed that reproduces this generator's values, if there is one.
    fn replay_seed(&self) -> Option<u64> {
        None
    }
}

/// [`ValueGenerator`] backed by a seeded `StdRng`.
#[derive(Debug, Clone)]
pub struct SeededGenerator {
    rng: StdRng,
    seed: u64,
}

impl SeededGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seeds from the thread RNG; the seed is kept so the run can be
    /// reported and replayed.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl ValueGenerator for SeededGenerator {
    fn product_title(&mut self) -> String {
        DISHES
            .choose(&mut self.rng)
            .copied()
            .unwrap_or("Dish")
            .to_string()
    }

    fn price(&mut self) -> i64 {
        self.rng.gen_range(100..200)
    }

    fn category_title(&mut self) -> String {
        let name = CATEGORY_NAMES
            .choose(&mut self.rng)
            .copied()
            .unwrap_or("Animal");
        format!("{} {}", name, self.rng.gen_range(1..1000))
    }

    fn absent_id(&mut self, taken: &[i64]) -> i64 {
        let taken: HashSet<i64> = taken.iter().copied().collect();
        for _ in 0..ABSENT_ID_ATTEMPTS {
            let candidate = self.rng.gen_range(ABSENT_ID_MIN..ABSENT_ID_MAX);
            if !taken.contains(&candidate) {
                return candidate;
            }
        }
        taken.iter().copied().max().unwrap_or(0).max(ABSENT_ID_MIN) + 1
    }

    fn replay_seed(&self) -> Option<u64> {
        Some(self.seed)
    }
}
