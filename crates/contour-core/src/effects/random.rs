//! Randomness effects
//!
//! Routing draws one value per tie-break; nothing is memoized between calls.

use async_trait::async_trait;

/// Source of uniformly distributed random numbers
#[async_trait]
pub trait RandomEffects: Send + Sync {
    /// Uniform random `u64`
    async fn random_u64(&self) -> u64;

    /// Uniform random float in `[0, 1)`
    async fn random_unit(&self) -> f64 {
        // 53 high bits give every representable step of an f64 mantissa.
        (self.random_u64().await >> 11) as f64 / (1u64 << 53) as f64
    }
}
