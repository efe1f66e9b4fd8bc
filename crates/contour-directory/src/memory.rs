//! In-process replicated register service
//!
//! `MemoryRegisterCluster` keeps one key/value map per replica and moves
//! state between them only through `gossip_round`, so replicas are as stale
//! as a real eventually consistent store until gossip runs. Partitioned
//! replicas neither gossip nor take part in quorum reads and writes.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use contour_core::{
    ConsistencyLevel, ContourError, ContourResult, JoinSemilattice, LwwRegister, NodeId,
    ReadConsistency, ReplicaId, ReplicatedRegisterEffects, WriteConsistency,
};

#[derive(Debug)]
struct ReplicaState<V> {
    id: ReplicaId,
    partitioned: bool,
    entries: BTreeMap<String, LwwRegister<V>>,
}

#[derive(Debug)]
struct ClusterState<V> {
    replicas: Vec<ReplicaState<V>>,
}

impl<V: Clone> ClusterState<V> {
    /// Replicas `origin` can reach, itself first
    fn reachable_from(&self, origin: usize) -> Vec<usize> {
        let mut out = vec![origin];
        if self.replicas[origin].partitioned {
            return out;
        }
        out.extend(
            self.replicas
                .iter()
                .enumerate()
                .filter(|(i, r)| *i != origin && !r.partitioned)
                .map(|(i, _)| i),
        );
        out
    }

    fn merge_into(&mut self, index: usize, key: &str, register: &LwwRegister<V>) -> bool {
        let entries = &mut self.replicas[index].entries;
        match entries.get_mut(key) {
            Some(existing) => {
                let merged = existing.join(register);
                let changed = merged.witness_cmp(existing) != std::cmp::Ordering::Equal;
                *existing = merged;
                changed
            }
            None => {
                entries.insert(key.to_string(), register.clone());
                true
            }
        }
    }
}

/// A set of in-memory replicas sharing one address space
#[derive(Debug)]
pub struct MemoryRegisterCluster<V> {
    state: Arc<RwLock<ClusterState<V>>>,
}

impl<V> Clone for MemoryRegisterCluster<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<V> MemoryRegisterCluster<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Cluster with one replica per given writer id
    pub fn with_replica_ids(ids: impl IntoIterator<Item = ReplicaId>) -> Self {
        let replicas = ids
            .into_iter()
            .map(|id| ReplicaState {
                id,
                partitioned: false,
                entries: BTreeMap::new(),
            })
            .collect();
        Self {
            state: Arc::new(RwLock::new(ClusterState { replicas })),
        }
    }

    /// Cluster with one replica per node, writer ids derived from the node ids
    pub fn for_nodes<'a>(nodes: impl IntoIterator<Item = &'a NodeId>) -> Self {
        Self::with_replica_ids(nodes.into_iter().map(ReplicaId::for_node))
    }

    /// Number of replicas
    pub fn len(&self) -> usize {
        self.state.read().replicas.len()
    }

    /// Whether the cluster has no replicas
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle that reads and writes through replica `index`
    pub fn replica(&self, index: usize) -> Option<MemoryReplica<V>> {
        let id = self.state.read().replicas.get(index)?.id;
        Some(MemoryReplica {
            cluster: self.clone(),
            index,
            id,
        })
    }

    /// Cut replica `index` off from every other replica
    pub fn partition(&self, index: usize) {
        if let Some(replica) = self.state.write().replicas.get_mut(index) {
            replica.partitioned = true;
            tracing::debug!(replica = %replica.id, "Replica partitioned");
        }
    }

    /// Reconnect replica `index`
    pub fn heal(&self, index: usize) {
        if let Some(replica) = self.state.write().replicas.get_mut(index) {
            replica.partitioned = false;
            tracing::debug!(replica = %replica.id, "Replica healed");
        }
    }

    /// One anti-entropy round: every connected replica ends with the join
    /// of all connected replicas' entries. Returns the number of
    /// `(replica, key)` entries that changed.
    pub fn gossip_round(&self) -> usize {
        let mut state = self.state.write();
        let connected: Vec<usize> = state
            .replicas
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.partitioned)
            .map(|(i, _)| i)
            .collect();

        let mut joined: BTreeMap<String, LwwRegister<V>> = BTreeMap::new();
        for &i in &connected {
            for (key, register) in &state.replicas[i].entries {
                joined
                    .entry(key.clone())
                    .and_modify(|acc| acc.join_assign(register))
                    .or_insert_with(|| register.clone());
            }
        }

        let mut changed = 0;
        for &i in &connected {
            for (key, register) in &joined {
                if state.merge_into(i, key, register) {
                    changed += 1;
                }
            }
        }
        tracing::trace!(replicas = connected.len(), keys = joined.len(), changed, "Gossip round");
        changed
    }

    /// Run `gossip_round` every `interval` until the handle is dropped
    pub fn spawn_gossip(&self, interval: Duration) -> GossipHandle {
        let cluster = self.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                cluster.gossip_round();
            }
        });
        GossipHandle { task }
    }

    fn put_at(
        &self,
        origin: usize,
        key: &str,
        register: &LwwRegister<V>,
        consistency: WriteConsistency,
    ) -> ContourResult<()> {
        let mut state = self.state.write();
        let total = state.replicas.len();
        let targets = match consistency.level {
            ConsistencyLevel::Local => vec![origin],
            ConsistencyLevel::Quorum | ConsistencyLevel::All => state.reachable_from(origin),
        };
        let required = consistency.level.required_replicas(total);
        if targets.len() < required {
            return Err(ContourError::directory_write(
                key,
                format!(
                    "{} write needs {required} of {total} replicas, {} reachable",
                    consistency.level,
                    targets.len()
                ),
            ));
        }
        for index in targets {
            state.merge_into(index, key, register);
        }
        Ok(())
    }

    fn get_at(
        &self,
        origin: usize,
        key: &str,
        consistency: ReadConsistency,
    ) -> ContourResult<Option<LwwRegister<V>>> {
        let state = self.state.read();
        let total = state.replicas.len();
        let sources = match consistency.level {
            ConsistencyLevel::Local => vec![origin],
            ConsistencyLevel::Quorum | ConsistencyLevel::All => state.reachable_from(origin),
        };
        let required = consistency.level.required_replicas(total);
        if sources.len() < required {
            return Err(ContourError::directory_read(
                key,
                format!(
                    "{} read needs {required} of {total} replicas, {} reachable",
                    consistency.level,
                    sources.len()
                ),
            ));
        }
        Ok(sources
            .into_iter()
            .filter_map(|i| state.replicas[i].entries.get(key))
            .fold(None, |acc: Option<LwwRegister<V>>, register| match acc {
                Some(acc) => Some(acc.join(register)),
                None => Some(register.clone()),
            }))
    }
}

/// Background gossip task; aborted on drop
#[derive(Debug)]
pub struct GossipHandle {
    task: JoinHandle<()>,
}

impl Drop for GossipHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One replica of a [`MemoryRegisterCluster`]
#[derive(Debug)]
pub struct MemoryReplica<V> {
    cluster: MemoryRegisterCluster<V>,
    index: usize,
    id: ReplicaId,
}

impl<V> Clone for MemoryReplica<V> {
    fn clone(&self) -> Self {
        Self {
            cluster: self.cluster.clone(),
            index: self.index,
            id: self.id,
        }
    }
}

impl<V> MemoryReplica<V> {
    /// Position of this replica in its cluster
    pub fn index(&self) -> usize {
        self.index
    }
}

#[async_trait]
impl<V> ReplicatedRegisterEffects<V> for MemoryReplica<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn replica_id(&self) -> ReplicaId {
        self.id
    }

    async fn put(
        &self,
        key: &str,
        register: LwwRegister<V>,
        consistency: WriteConsistency,
    ) -> ContourResult<()> {
        self.cluster.put_at(self.index, key, &register, consistency)
    }

    async fn get(
        &self,
        key: &str,
        consistency: ReadConsistency,
    ) -> ContourResult<Option<LwwRegister<V>>> {
        self.cluster.get_at(self.index, key, consistency)
    }

    async fn list_keys(&self) -> ContourResult<BTreeSet<String>> {
        let state = self.cluster.state.read();
        Ok(state.replicas[self.index].entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn cluster(n: usize) -> MemoryRegisterCluster<String> {
        let nodes: Vec<NodeId> = (1..=n).map(|i| NodeId::new(format!("node{i}")).unwrap()).collect();
        MemoryRegisterCluster::for_nodes(&nodes)
    }

    fn reg(value: &str, ts: u64, replica: &MemoryReplica<String>) -> LwwRegister<String> {
        LwwRegister::new(value.to_string(), ts, replica.replica_id())
    }

    #[tokio::test]
    async fn local_writes_stay_local_until_gossip() {
        let cluster = cluster(3);
        let r0 = cluster.replica(0).unwrap();
        let r1 = cluster.replica(1).unwrap();

        r0.put("k", reg("v", 1, &r0), WriteConsistency::local()).await.unwrap();
        assert!(r1.get("k", ReadConsistency::local()).await.unwrap().is_none());
        assert!(r1.list_keys().await.unwrap().is_empty());

        assert_eq!(cluster.gossip_round(), 2);
        let seen = r1.get("k", ReadConsistency::local()).await.unwrap().unwrap();
        assert_eq!(seen.value(), "v");
        assert_eq!(cluster.gossip_round(), 0);
    }

    #[tokio::test]
    async fn quorum_write_reaches_connected_replicas() {
        let cluster = cluster(3);
        let r0 = cluster.replica(0).unwrap();
        cluster.partition(2);

        r0.put("k", reg("v", 1, &r0), WriteConsistency::quorum(Duration::from_secs(1)))
            .await
            .unwrap();
        let r1 = cluster.replica(1).unwrap();
        let r2 = cluster.replica(2).unwrap();
        assert!(r1.get("k", ReadConsistency::local()).await.unwrap().is_some());
        assert!(r2.get("k", ReadConsistency::local()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_write_modifies_no_replica() {
        let cluster = cluster(3);
        cluster.partition(0);
        let r0 = cluster.replica(0).unwrap();

        let result = r0
            .put("k", reg("v", 1, &r0), WriteConsistency::all(Duration::from_secs(1)))
            .await;
        assert_matches!(result, Err(ContourError::DirectoryWrite { .. }));
        for i in 0..3 {
            let replica = cluster.replica(i).unwrap();
            assert!(replica.list_keys().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn quorum_read_joins_replica_values_and_fails_when_isolated() {
        let cluster = cluster(3);
        let r0 = cluster.replica(0).unwrap();
        let r1 = cluster.replica(1).unwrap();
        r0.put("k", reg("old", 1, &r0), WriteConsistency::local()).await.unwrap();
        r1.put("k", reg("new", 2, &r1), WriteConsistency::local()).await.unwrap();

        let read = r0
            .get("k", ReadConsistency::quorum(Duration::from_secs(1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.value(), "new");

        cluster.partition(0);
        assert_matches!(
            r0.get("k", ReadConsistency::quorum(Duration::from_secs(1))).await,
            Err(ContourError::DirectoryRead { .. })
        );
        assert_eq!(r0.get("k", ReadConsistency::local()).await.unwrap().unwrap().value(), "old");
    }

    #[tokio::test]
    async fn partitioned_replica_catches_up_after_heal() {
        let cluster = cluster(2);
        let r0 = cluster.replica(0).unwrap();
        let r1 = cluster.replica(1).unwrap();
        cluster.partition(1);

        r0.put("k", reg("v", 1, &r0), WriteConsistency::local()).await.unwrap();
        cluster.gossip_round();
        assert!(r1.get("k", ReadConsistency::local()).await.unwrap().is_none());

        cluster.heal(1);
        cluster.gossip_round();
        assert!(r1.get("k", ReadConsistency::local()).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn background_gossip_converges_and_stops_on_drop() {
        let cluster = cluster(2);
        let r0 = cluster.replica(0).unwrap();
        let r1 = cluster.replica(1).unwrap();
        let handle = cluster.spawn_gossip(Duration::from_millis(100));

        r0.put("a", reg("1", 1, &r0), WriteConsistency::local()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(r1.get("a", ReadConsistency::local()).await.unwrap().is_some());

        drop(handle);
        r0.put("b", reg("2", 2, &r0), WriteConsistency::local()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(r1.get("b", ReadConsistency::local()).await.unwrap().is_none());
    }

    #[test]
    fn unknown_replica_index_yields_none() {
        assert!(cluster(1).replica(1).is_none());
        assert_eq!(cluster(2).len(), 2);
    }
}
