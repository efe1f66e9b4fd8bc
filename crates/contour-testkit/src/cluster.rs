//! In-process multi-node clusters
//!
//! Every node gets its own `MessageSystem` reading and writing through its
//! own replica of one `MemoryRegisterCluster`. All nodes share a single
//! `LocalTransport`, so a handler identity is reachable from any node once
//! its registration has gossiped there.

use std::sync::Arc;
use std::time::Duration;

use contour_core::{
    ContourError, ContourResult, HandlerIdentity, HandlerRegistration, NodeConfig, NodeId,
    PhysicalTimeEffects,
};
use contour_directory::{GossipHandle, MemoryRegisterCluster, SystemTimeHandler};
use contour_predicate::Message;
use contour_routing::{LocalTransport, MessageSystem, TrustWeighting};

use crate::effects::SeededRandom;

/// Poll interval used by test nodes unless configured otherwise
pub const TEST_GOSSIP_TIME_FRAME_MS: u64 = 50;

/// Builder for [`TestCluster`]
pub struct TestClusterBuilder {
    configs: Vec<NodeConfig>,
    seed: u64,
    weighting: TrustWeighting,
    time: Option<Arc<dyn PhysicalTimeEffects>>,
}

impl std::fmt::Debug for TestClusterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClusterBuilder")
            .field("nodes", &self.configs.len())
            .field("seed", &self.seed)
            .field("weighting", &self.weighting)
            .finish_non_exhaustive()
    }
}

impl Default for TestClusterBuilder {
    fn default() -> Self {
        Self {
            configs: Vec::new(),
            seed: 42,
            weighting: TrustWeighting::default(),
            time: None,
        }
    }
}

impl TestClusterBuilder {
    /// Add a node with test defaults
    pub fn node(self, node_id: &str) -> Self {
        let mut config = NodeConfig::for_node(node_id);
        config.gossip_time_frame_ms = TEST_GOSSIP_TIME_FRAME_MS;
        self.node_config(config)
    }

    /// Add a node with the given settings
    pub fn node_config(mut self, config: NodeConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Seed of the first node's tie-break randomness; node `i` uses `seed + i`
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Tie-break curve for every node
    pub fn weighting(mut self, weighting: TrustWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Clock shared by every node; the system clock by default
    pub fn time(mut self, time: Arc<dyn PhysicalTimeEffects>) -> Self {
        self.time = Some(time);
        self
    }

    /// Build one message system per node
    pub fn build<M: Message>(self) -> ContourResult<TestCluster<M>> {
        let node_ids = self
            .configs
            .iter()
            .map(NodeConfig::node_id)
            .collect::<ContourResult<Vec<NodeId>>>()?;
        let registers = MemoryRegisterCluster::<HandlerRegistration>::for_nodes(&node_ids);
        let transport = LocalTransport::new();
        let time = self
            .time
            .unwrap_or_else(|| Arc::new(SystemTimeHandler::new()));

        let mut systems = Vec::with_capacity(self.configs.len());
        for (index, config) in self.configs.into_iter().enumerate() {
            let replica = registers.replica(index).ok_or_else(|| {
                ContourError::internal(format!("no replica for node index {index}"))
            })?;
            let system = MessageSystem::builder(config)
                .registers(Arc::new(replica))
                .transport(transport.clone())
                .time(Arc::clone(&time))
                .random(Arc::new(SeededRandom::new(self.seed.wrapping_add(index as u64))))
                .weighting(self.weighting)
                .build()?;
            systems.push(system);
        }

        Ok(TestCluster {
            registers,
            transport,
            systems,
            gossip: None,
        })
    }
}

/// Several message systems forming one cluster inside the test process
pub struct TestCluster<M: Message> {
    registers: MemoryRegisterCluster<HandlerRegistration>,
    transport: LocalTransport<M>,
    systems: Vec<MessageSystem<M>>,
    gossip: Option<GossipHandle>,
}

impl<M: Message> std::fmt::Debug for TestCluster<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCluster")
            .field("nodes", &self.systems.len())
            .field("gossiping", &self.gossip.is_some())
            .finish()
    }
}

impl<M: Message> TestCluster<M> {
    /// Start describing a cluster
    pub fn builder() -> TestClusterBuilder {
        TestClusterBuilder::default()
    }

    /// Cluster of nodes with test defaults
    pub fn with_nodes(node_ids: &[&str]) -> ContourResult<Self> {
        node_ids
            .iter()
            .fold(Self::builder(), |builder, id| builder.node(id))
            .build()
    }

    /// System of node `index`
    ///
    /// # Panics
    ///
    /// When `index` is out of range.
    pub fn node(&self, index: usize) -> &MessageSystem<M> {
        &self.systems[index]
    }

    /// Every node's system
    pub fn nodes(&self) -> &[MessageSystem<M>] {
        &self.systems
    }

    /// The replicated register store behind every directory
    pub fn registers(&self) -> &MemoryRegisterCluster<HandlerRegistration> {
        &self.registers
    }

    /// The shared transport
    pub fn transport(&self) -> &LocalTransport<M> {
        &self.transport
    }

    /// Start every node; returns all published identities
    pub async fn start_all(&self) -> ContourResult<Vec<HandlerIdentity>> {
        let mut published = Vec::new();
        for system in &self.systems {
            published.extend(system.start().await?);
        }
        Ok(published)
    }

    /// Run gossip rounds until nothing changes; returns the rounds run
    pub fn converge(&self) -> usize {
        let mut rounds = 1;
        while self.registers.gossip_round() > 0 {
            rounds += 1;
        }
        rounds
    }

    /// Gossip in the background every `interval` until stopped or dropped
    pub fn start_gossip(&mut self, interval: Duration) {
        self.gossip = Some(self.registers.spawn_gossip(interval));
    }

    /// Stop background gossip
    pub fn stop_gossip(&mut self) {
        self.gossip = None;
    }

    /// Cut node `index`'s replica off from the others
    pub fn partition(&self, index: usize) {
        self.registers.partition(index);
    }

    /// Reconnect node `index`'s replica
    pub fn heal(&self, index: usize) {
        self.registers.heal(index);
    }

    /// Stop gossip and every node
    pub fn shutdown(&mut self) {
        self.stop_gossip();
        for system in &self.systems {
            system.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{pattern, recorder};
    use contour_core::ProcessingUnitId;
    use contour_predicate::XmlMessage;

    #[tokio::test]
    async fn publishes_stay_local_until_gossip() {
        let cluster = TestCluster::<XmlMessage>::with_nodes(&["node1", "node2"]).unwrap();
        let (handler, _rx) = recorder();
        cluster
            .node(0)
            .register(pattern(&["/a"]), handler, ProcessingUnitId::new("a").unwrap())
            .unwrap();
        cluster.start_all().await.unwrap();

        let id = HandlerIdentity::new("node1_a").unwrap();
        assert!(cluster.node(1).directory().get(&id).await.unwrap().is_none());

        assert!(cluster.converge() >= 2);
        assert!(cluster.node(1).directory().get(&id).await.unwrap().is_some());
        assert_eq!(cluster.converge(), 1);
    }

    #[test]
    fn invalid_node_id_fails_build() {
        let result = TestCluster::<XmlMessage>::builder()
            .node_config(NodeConfig::for_node(""))
            .build::<XmlMessage>();
        assert!(result.is_err());
    }
}
