//! Readiness polling after a batch of publishes
//!
//! The directory gives no push notification when an update has spread, so
//! callers poll: a bounded number of attempts with a fixed sleep between
//! them. Each attempt checks that the expected identities are enumerable on
//! the local replica and that their registrations read back non-absent.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use contour_core::{HandlerIdentity, PhysicalTimeEffects};

use crate::directory::Directory;

/// How many of the expected identities must be visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessThreshold {
    /// Every expected identity
    #[default]
    All,
    /// A strict majority of the expected identities
    Majority,
    /// At least this many (capped at the expected count)
    AtLeast(usize),
}

impl ReadinessThreshold {
    fn required(self, expected: usize) -> usize {
        match self {
            Self::All => expected,
            Self::Majority => expected / 2 + 1,
            Self::AtLeast(n) => n,
        }
        .min(expected)
    }
}

/// Outcome of a single readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    /// Expected identities enumerable with a non-absent registration
    pub visible: BTreeSet<HandlerIdentity>,
    /// Expected identities not yet observed
    pub missing: BTreeSet<HandlerIdentity>,
    /// Number of visible identities needed
    pub required: usize,
}

impl ReadinessReport {
    /// Whether enough identities are visible
    pub fn is_ready(&self) -> bool {
        self.visible.len() >= self.required
    }
}

/// Polls a [`Directory`] until expected registrations are observable
#[derive(Clone)]
pub struct ConvergenceChecker {
    directory: Directory,
    time: Arc<dyn PhysicalTimeEffects>,
    expected: BTreeSet<HandlerIdentity>,
    threshold: ReadinessThreshold,
}

impl std::fmt::Debug for ConvergenceChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergenceChecker")
            .field("directory", &self.directory)
            .field("expected", &self.expected)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl ConvergenceChecker {
    /// Wait for every identity in `expected`
    pub fn new(
        directory: Directory,
        time: Arc<dyn PhysicalTimeEffects>,
        expected: impl IntoIterator<Item = HandlerIdentity>,
    ) -> Self {
        Self {
            directory,
            time,
            expected: expected.into_iter().collect(),
            threshold: ReadinessThreshold::All,
        }
    }

    /// Relax how many expected identities must be visible
    pub fn with_threshold(mut self, threshold: ReadinessThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    /// Identities this checker waits for
    pub fn expected(&self) -> &BTreeSet<HandlerIdentity> {
        &self.expected
    }

    /// One readiness check against the local replica.
    ///
    /// Read failures count as not yet visible.
    pub async fn check(&self) -> ReadinessReport {
        let enumerated = match self.directory.enumerate_keys().await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::debug!(error = %err, "Key enumeration failed during readiness check");
                BTreeSet::new()
            }
        };

        let mut visible = BTreeSet::new();
        let mut missing = BTreeSet::new();
        for identity in &self.expected {
            let present = enumerated.contains(identity)
                && match self.directory.get(identity).await {
                    Ok(found) => found.is_some(),
                    Err(err) => {
                        tracing::debug!(identity = %identity, error = %err, "Readiness read failed");
                        false
                    }
                };
            if present {
                visible.insert(identity.clone());
            } else {
                missing.insert(identity.clone());
            }
        }

        ReadinessReport {
            visible,
            missing,
            required: self.threshold.required(self.expected.len()),
        }
    }

    /// Poll up to `max_attempts` times, sleeping `poll_interval` between
    /// attempts. Returns `true` on the first successful check and `false`
    /// once attempts run out. Zero attempts never succeeds.
    #[tracing::instrument(skip(self), fields(expected = self.expected.len()))]
    pub async fn is_ready(&self, max_attempts: u32, poll_interval: Duration) -> bool {
        for attempt in 1..=max_attempts {
            let report = self.check().await;
            tracing::debug!(
                attempt,
                visible = report.visible.len(),
                required = report.required,
                "Readiness check"
            );
            if report.is_ready() {
                return true;
            }
            if attempt < max_attempts {
                self.time.sleep(poll_interval).await;
            }
        }
        tracing::warn!(max_attempts, ?poll_interval, "Directory did not converge");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::SystemTimeHandler;
    use crate::memory::MemoryRegisterCluster;
    use contour_core::{HandlerRegistration, NodeId, Pattern, TrustWeight};

    struct Fixture {
        cluster: MemoryRegisterCluster<HandlerRegistration>,
        writer: Directory,
        reader: Directory,
    }

    fn fixture() -> Fixture {
        let nodes = [NodeId::new("node1").unwrap(), NodeId::new("node2").unwrap()];
        let cluster = MemoryRegisterCluster::for_nodes(&nodes);
        let time = Arc::new(SystemTimeHandler::new());
        let writer = Directory::new(Arc::new(cluster.replica(0).unwrap()), time.clone());
        let reader = Directory::new(Arc::new(cluster.replica(1).unwrap()), time);
        Fixture {
            cluster,
            writer,
            reader,
        }
    }

    fn id(s: &str) -> HandlerIdentity {
        HandlerIdentity::new(s).unwrap()
    }

    async fn publish(dir: &Directory, identity: &str) {
        let pattern = Pattern::new(["/a"]).unwrap();
        dir.publish(&id(identity), vec![pattern], TrustWeight::TRUSTED)
            .await
            .unwrap();
    }

    fn checker(dir: &Directory, expected: &[&str]) -> ConvergenceChecker {
        ConvergenceChecker::new(
            dir.clone(),
            Arc::new(SystemTimeHandler::new()),
            expected.iter().map(|s| id(s)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ready_once_gossip_delivers() {
        let f = fixture();
        publish(&f.writer, "node1_a").await;
        let checker = checker(&f.reader, &["node1_a"]);

        assert!(!checker.is_ready(2, Duration::from_millis(10)).await);
        f.cluster.gossip_round();
        assert!(checker.is_ready(1, Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_within_attempt_bound() {
        let f = fixture();
        let checker = checker(&f.reader, &["node1_missing"]);

        let start = tokio::time::Instant::now();
        assert!(!checker.is_ready(3, Duration::from_millis(100)).await);
        let elapsed = start.elapsed();
        assert!(elapsed <= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_mid_poll_when_background_gossip_runs() {
        let f = fixture();
        let _gossip = f.cluster.spawn_gossip(Duration::from_millis(50));
        publish(&f.writer, "node1_a").await;

        let checker = checker(&f.reader, &["node1_a"]);
        assert!(checker.is_ready(5, Duration::from_millis(40)).await);
    }

    #[tokio::test]
    async fn zero_attempts_is_never_ready() {
        let f = fixture();
        assert!(!checker(&f.reader, &[]).is_ready(0, Duration::ZERO).await);
        assert!(checker(&f.reader, &[]).is_ready(1, Duration::ZERO).await);
    }

    #[tokio::test]
    async fn thresholds_relax_required_count() {
        let f = fixture();
        publish(&f.reader, "node2_a").await;
        publish(&f.reader, "node2_b").await;
        let expected = ["node2_a", "node2_b", "node2_c"];

        let report = checker(&f.reader, &expected).check().await;
        assert_eq!(report.visible.len(), 2);
        assert_eq!(report.missing, BTreeSet::from([id("node2_c")]));
        assert!(!report.is_ready());

        let majority = checker(&f.reader, &expected).with_threshold(ReadinessThreshold::Majority);
        assert!(majority.check().await.is_ready());
        let at_least = checker(&f.reader, &expected).with_threshold(ReadinessThreshold::AtLeast(3));
        assert!(!at_least.check().await.is_ready());
    }
}
