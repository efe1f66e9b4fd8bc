//! Contour Directory - where content handlers are found
//!
//! The replicated directory maps handler identities to their published
//! patterns and trust weight. It is read through one replica at a time and
//! is only eventually consistent, so this crate also provides the readiness
//! poll that tells a publisher when its update can be relied upon.
//!
//! The register service itself is an effect (`ReplicatedRegisterEffects`);
//! `MemoryRegisterCluster` is the in-process implementation used for
//! single-process deployments and tests.

#![forbid(unsafe_code)]

pub mod convergence;
pub mod directory;
pub mod handlers;
pub mod memory;

pub use convergence::{ConvergenceChecker, ReadinessReport, ReadinessThreshold};
pub use directory::Directory;
pub use handlers::{SystemTimeHandler, ThreadRandomHandler};
pub use memory::{GossipHandle, MemoryRegisterCluster, MemoryReplica};
