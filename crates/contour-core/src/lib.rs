//! Contour Core - foundation of content-based message routing
//!
//! Handlers publish content predicates under a handler identity into a
//! replicated directory; senders route by content instead of by address.
//! This crate holds the pure pieces every layer agrees on:
//!
//! - Identifiers: `NodeId`, `ProcessingUnitId`, `HandlerIdentity` (`{node}_{unit}`), `ReplicaId`
//! - Published data: `Pattern` (AND of conjuncts), `HandlerRegistration` (OR of patterns), `TrustWeight`
//! - Merge: `LwwRegister` under the `JoinSemilattice` laws
//! - Effect interfaces: replicated registers, physical time, randomness
//! - `ContourError`, the unified per-operation error
//! - `NodeConfig`, the per-node settings
//!
//! Nothing here performs I/O except configuration loading.

#![forbid(unsafe_code)]

pub mod config;
pub mod effects;
pub mod errors;
pub mod identifiers;
pub mod pattern;
pub mod registration;
pub mod semilattice;

pub use config::{NodeConfig, ProcessingUnitProps};
pub use effects::{
    ConsistencyLevel, PhysicalTimeEffects, RandomEffects, ReadConsistency,
    ReplicatedRegisterEffects, WriteConsistency,
};
pub use errors::{ContourError, Result as ContourResult};
pub use identifiers::{HandlerIdentity, NodeId, ProcessingUnitId, ReplicaId};
pub use pattern::Pattern;
pub use registration::{HandlerRegistration, TrustWeight};
pub use semilattice::{JoinSemilattice, LwwRegister};
