use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out one generator per settlement
pub trait RandomSource: Send + Sync {
    fn rng(&self) -> Box<dyn RngCore + Send>;
}

/// OS-seeded generators for production play
#[derive(Debug, Default, Clone, Copy)]
pub struct EntropySource;

impl RandomSource for EntropySource {
    fn rng(&self) -> Box<dyn RngCore + Send> {
        Box::new(StdRng::from_entropy())
    }
}

/// Reproducible generators: the n-th call is seeded with `seed + n`
#[derive(Debug)]
pub struct SeededSource {
    seed: u64,
    calls: AtomicU64,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            calls: AtomicU64::new(0),
        }
    }
}

impl RandomSource for SeededSource {
    fn rng(&self) -> Box<dyn RngCore + Send> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        Box::new(StdRng::seed_from_u64(self.seed.wrapping_add(n)))
    }
}
