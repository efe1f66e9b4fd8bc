//! Physical time effects

use async_trait::async_trait;
use std::time::Duration;

/// Wall-clock time and suspension
#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Current Unix time in milliseconds
    async fn now_ms(&self) -> u64;

    /// Suspend the calling task without blocking a worker thread
    async fn sleep(&self, duration: Duration);
}
