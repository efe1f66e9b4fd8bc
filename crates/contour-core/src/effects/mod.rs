//! Effect interfaces consumed by the routing core
//!
//! These are pure signatures. Production handlers live in
//! `contour-directory`; deterministic handlers for tests live in
//! `contour-testkit`. Everything is object-safe so callers can hold
//! `Arc<dyn ...>` and several independent systems can share one process.

pub mod random;
pub mod register;
pub mod time;

pub use random::RandomEffects;
pub use register::{
    ConsistencyLevel, ReadConsistency, ReplicatedRegisterEffects, WriteConsistency,
};
pub use time::PhysicalTimeEffects;
