//! Replicated handler directory
//!
//! Maps each handler identity to its published registration. Each identity
//! is written only by the node that owns it, and the whole registration is
//! one last-writer-wins value, so a republish replaces the pattern list
//! instead of merging into it.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contour_core::{
    ContourResult, HandlerIdentity, HandlerRegistration, LwwRegister, NodeConfig, Pattern,
    PhysicalTimeEffects, ReadConsistency, ReplicatedRegisterEffects, TrustWeight,
    WriteConsistency,
};

/// Directory view through one replica
#[derive(Clone)]
pub struct Directory {
    registers: Arc<dyn ReplicatedRegisterEffects<HandlerRegistration>>,
    time: Arc<dyn PhysicalTimeEffects>,
    read: ReadConsistency,
    write: WriteConsistency,
    last_timestamp: Arc<AtomicU64>,
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("replica", &self.registers.replica_id())
            .field("read", &self.read.level)
            .field("write", &self.write.level)
            .finish()
    }
}

impl Directory {
    /// Directory with local reads and writes
    pub fn new(
        registers: Arc<dyn ReplicatedRegisterEffects<HandlerRegistration>>,
        time: Arc<dyn PhysicalTimeEffects>,
    ) -> Self {
        Self {
            registers,
            time,
            read: ReadConsistency::local(),
            write: WriteConsistency::local(),
            last_timestamp: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Directory using the consistency levels configured for the node
    pub fn from_config(
        config: &NodeConfig,
        registers: Arc<dyn ReplicatedRegisterEffects<HandlerRegistration>>,
        time: Arc<dyn PhysicalTimeEffects>,
    ) -> Self {
        Self::new(registers, time)
            .with_read_consistency(config.read_consistency())
            .with_write_consistency(config.write_consistency())
    }

    /// Set the consistency used by `get`
    pub fn with_read_consistency(mut self, read: ReadConsistency) -> Self {
        self.read = read;
        self
    }

    /// Set the consistency used by `publish`
    pub fn with_write_consistency(mut self, write: WriteConsistency) -> Self {
        self.write = write;
        self
    }

    /// Publish `patterns` under `identity`, replacing any earlier registration.
    ///
    /// An empty pattern list fails with `Validation` before anything is
    /// written. `DirectoryWrite` means the write consistency could not be met.
    #[tracing::instrument(skip_all, fields(identity = %identity, patterns = patterns.len()))]
    pub async fn publish(
        &self,
        identity: &HandlerIdentity,
        patterns: Vec<Pattern>,
        trust_weight: TrustWeight,
    ) -> ContourResult<()> {
        let registration = HandlerRegistration::new(patterns, trust_weight)?;
        self.publish_registration(identity, registration).await
    }

    /// Publish an already validated registration
    pub async fn publish_registration(
        &self,
        identity: &HandlerIdentity,
        registration: HandlerRegistration,
    ) -> ContourResult<()> {
        let timestamp = self.next_timestamp().await;
        let trust_weight = registration.trust_weight().get();
        let register = LwwRegister::new(registration, timestamp, self.registers.replica_id());

        self.registers
            .put(identity.as_str(), register, self.write)
            .await
            .map_err(|err| {
                tracing::warn!(identity = %identity, error = %err, "Directory publish failed");
                err
            })?;
        tracing::debug!(identity = %identity, timestamp, trust_weight, "Published registration");
        Ok(())
    }

    /// Identities visible to the local replica
    pub async fn enumerate_keys(&self) -> ContourResult<BTreeSet<HandlerIdentity>> {
        let keys = self.registers.list_keys().await?;
        Ok(keys.into_iter().map(HandlerIdentity::from_key).collect())
    }

    /// Registration published under `identity`, if any has reached this replica
    pub async fn get(
        &self,
        identity: &HandlerIdentity,
    ) -> ContourResult<Option<HandlerRegistration>> {
        let found = self.registers.get(identity.as_str(), self.read).await?;
        tracing::trace!(identity = %identity, found = found.is_some(), "Directory read");
        Ok(found.map(LwwRegister::into_value))
    }

    /// Write witness strictly greater than any this handle has issued
    async fn next_timestamp(&self) -> u64 {
        let now = self.time.now_ms().await;
        let mut previous = self.last_timestamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(previous.saturating_add(1));
            match self.last_timestamp.compare_exchange_weak(
                previous,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => previous = actual,
            }
        }
    }
}
