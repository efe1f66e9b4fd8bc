//! Replicated register service interface
//!
//! A per-key last-writer-wins cell with tunable read and write consistency.
//! The conflict-free merge itself is [`crate::semilattice::LwwRegister::join`];
//! implementations only decide which replicas see a write or answer a read.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use crate::errors::Result;
use crate::identifiers::ReplicaId;
use crate::semilattice::LwwRegister;

/// How many replicas must take part in a read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyLevel {
    /// Only the local replica
    #[default]
    Local,
    /// A strict majority of replicas
    Quorum,
    /// Every replica
    All,
}

impl ConsistencyLevel {
    /// Number of replicas required out of `total`
    pub fn required_replicas(self, total: usize) -> usize {
        match self {
            Self::Local => total.min(1),
            Self::Quorum => total / 2 + 1,
            Self::All => total,
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Quorum => f.write_str("quorum"),
            Self::All => f.write_str("all"),
        }
    }
}

/// Consistency requested for a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadConsistency {
    /// Replicas that must answer
    pub level: ConsistencyLevel,
    /// Upper bound on how long to wait for them
    pub timeout: Duration,
}

impl ReadConsistency {
    /// Read the local replica only
    pub fn local() -> Self {
        Self {
            level: ConsistencyLevel::Local,
            timeout: Duration::ZERO,
        }
    }

    /// Read from a majority of replicas
    pub fn quorum(timeout: Duration) -> Self {
        Self {
            level: ConsistencyLevel::Quorum,
            timeout,
        }
    }

    /// Read from every replica
    pub fn all(timeout: Duration) -> Self {
        Self {
            level: ConsistencyLevel::All,
            timeout,
        }
    }
}

/// Consistency requested for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteConsistency {
    /// Replicas that must acknowledge
    pub level: ConsistencyLevel,
    /// Upper bound on how long to wait for acknowledgements
    pub timeout: Duration,
}

impl WriteConsistency {
    /// Acknowledge once the local replica has the write
    pub fn local() -> Self {
        Self {
            level: ConsistencyLevel::Local,
            timeout: Duration::ZERO,
        }
    }

    /// Acknowledge once a majority of replicas have the write
    pub fn quorum(timeout: Duration) -> Self {
        Self {
            level: ConsistencyLevel::Quorum,
            timeout,
        }
    }

    /// Acknowledge once every replica has the write
    pub fn all(timeout: Duration) -> Self {
        Self {
            level: ConsistencyLevel::All,
            timeout,
        }
    }
}

/// Replicated last-writer-wins key/value cells
#[async_trait]
pub trait ReplicatedRegisterEffects<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Identifier of the replica this handle writes through
    fn replica_id(&self) -> ReplicaId;

    /// Merge `register` into `key` on enough replicas to satisfy `consistency`.
    ///
    /// Fails with `DirectoryWrite` if the requested consistency cannot be met.
    async fn put(
        &self,
        key: &str,
        register: LwwRegister<V>,
        consistency: WriteConsistency,
    ) -> Result<()>;

    /// Read `key`; `Ok(None)` means no write has reached the replicas consulted
    async fn get(&self, key: &str, consistency: ReadConsistency)
        -> Result<Option<LwwRegister<V>>>;

    /// Keys visible to the local replica
    async fn list_keys(&self) -> Result<BTreeSet<String>>;
}
