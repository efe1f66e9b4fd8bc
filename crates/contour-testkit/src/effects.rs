//! Deterministic effect handlers
//!
//! - Deterministic randomness using a seeded ChaCha20 RNG
//! - Scripted randomness replaying fixed draws
//! - A virtual clock whose sleeps advance time instead of waiting

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contour_core::{PhysicalTimeEffects, RandomEffects};

/// Reproducible random draws
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SeededRandom {
    /// Generator seeded from `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
        }
    }
}

impl Default for SeededRandom {
    fn default() -> Self {
        Self::new(42)
    }
}

#[async_trait]
impl RandomEffects for SeededRandom {
    async fn random_u64(&self) -> u64 {
        self.rng.lock().next_u64()
    }
}

/// Replays the given draws in a loop
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    draws: Arc<Vec<u64>>,
    next: Arc<AtomicU64>,
}

impl ScriptedRandom {
    /// Replay `draws`; an empty script always draws 0
    pub fn new(draws: impl IntoIterator<Item = u64>) -> Self {
        Self {
            draws: Arc::new(draws.into_iter().collect()),
            next: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Draw landing at fraction `unit` of the `u64` range
    pub fn at_fraction(unit: f64) -> u64 {
        (unit.clamp(0.0, 1.0) * u64::MAX as f64) as u64
    }
}

#[async_trait]
impl RandomEffects for ScriptedRandom {
    async fn random_u64(&self) -> u64 {
        if self.draws.is_empty() {
            return 0;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) as usize;
        self.draws[i % self.draws.len()]
    }
}

/// Virtual clock in milliseconds
///
/// `sleep` advances the clock by the requested duration and yields once, so
/// a poll loop driven by it finishes immediately while its elapsed virtual
/// time stays observable.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTime {
    now_ms: Arc<AtomicU64>,
}

impl SimulatedTime {
    /// Clock starting at `start_ms`
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Current virtual time
    pub fn current_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::AcqRel);
    }

    /// Set the clock; it never moves backwards
    pub fn set(&self, ms: u64) {
        self.now_ms.fetch_max(ms, Ordering::AcqRel);
    }
}

#[async_trait]
impl PhysicalTimeEffects for SimulatedTime {
    async fn now_ms(&self) -> u64 {
        self.current_ms()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
