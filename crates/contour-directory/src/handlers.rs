//! Production time and randomness handlers
//!
//! Stateless bridges from the effect traits in `contour-core` to the
//! operating system. Deterministic replacements live in `contour-testkit`.

use async_trait::async_trait;
use contour_core::{PhysicalTimeEffects, RandomEffects};
use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock time and tokio sleeps
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeHandler;

impl SystemTimeHandler {
    /// Create a new system time handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhysicalTimeEffects for SystemTimeHandler {
    async fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Thread-local OS-seeded randomness
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandomHandler;

impl ThreadRandomHandler {
    /// Create a new random handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RandomEffects for ThreadRandomHandler {
    async fn random_u64(&self) -> u64 {
        rand::thread_rng().gen()
    }
}
