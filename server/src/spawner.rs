use crate::world::World;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Category, ObjectInfo};

/// Fills the world with randomly chosen items. Placement is not modelled.
#[derive(Debug)]
pub struct ItemSpawner {
    count: usize,
    max_value: u32,
    rng: StdRng,
}

impl ItemSpawner {
    pub fn new(count: usize, max_value: u32) -> Self {
        Self::with_rng(count, max_value, StdRng::from_entropy())
    }

    /// Deterministic spawner for tests and replays.
    pub fn seeded(count: usize, max_value: u32, seed: u64) -> Self {
        Self::with_rng(count, max_value, StdRng::seed_from_u64(seed))
    }

    fn with_rng(count: usize, max_value: u32, rng: StdRng) -> Self {
        Self {
            count,
            max_value: max_value.max(1),
            rng,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn populate(&mut self, world: &mut World) -> Vec<ObjectInfo> {
        (0..self.count)
            .map(|_| {
                let category = Category::ALL[self.rng.gen_range(0..Category::ALL.len())];
                let value = self.rng.gen_range(1..=self.max_value);
                world.spawn_item(category, value)
            })
            .collect()
    }
}
