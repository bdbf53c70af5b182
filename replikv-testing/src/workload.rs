use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use replikv_core::Command;

/// Patterns used by generated `list` commands, including one that does not
/// compile.
const FILTERS: &[&str] = &["^key-1", "-[0-3]$", "key", "[", ""];

/// Seeded generator of mixed read/write command streams.
pub struct WorkloadGenerator {
    rng: StdRng,
    keys: Vec<String>,
}

impl WorkloadGenerator {
    pub fn new(seed: u64, key_space: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            keys: (0..key_space.max(1)).map(|i| format!("key-{}", i)).collect(),
        }
    }

    pub fn next_command(&mut self) -> Command {
        let key = self.keys[self.rng.gen_range(0..self.keys.len())].clone();
        match self.rng.gen_range(0..100) {
            0..=29 => Command::get(key),
            30..=64 => Command::set(key, self.value()),
            65..=79 => Command::remove(key),
            80..=89 => {
                let filter = FILTERS[self.rng.gen_range(0..FILTERS.len())];
                Command::list(self.rng.gen_bool(0.8).then_some(filter))
            }
            _ => Command::clear(key, self.value()),
        }
    }

    pub fn commands(&mut self, count: usize) -> Vec<Command> {
        (0..count).map(|_| self.next_command()).collect()
    }

    fn value(&mut self) -> Vec<u8> {
        let len = self.rng.gen_range(0..16);
        (0..len).map(|_| self.rng.gen()).collect()
    }
}
