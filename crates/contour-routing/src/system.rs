//! The message system context object
//!
//! A `MessageSystem` ties one node's directory view, router and processing
//! units together. There is no global instance: every system is built
//! explicitly, and several can live in one process (sharing a
//! `LocalTransport` and a register cluster to form an in-process cluster).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use contour_core::{
    ContourError, ContourResult, HandlerIdentity, HandlerRegistration, NodeConfig, NodeId,
    Pattern, PhysicalTimeEffects, ProcessingUnitId, RandomEffects, ReplicatedRegisterEffects,
};
use contour_directory::{
    ConvergenceChecker, Directory, MemoryRegisterCluster, SystemTimeHandler, ThreadRandomHandler,
};
use contour_predicate::{Message, PredicateEngine};

use crate::candidate::RoutingDecision;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::receiver::Sender;
use crate::registry::{HandlerRegistry, MessageHandler};
use crate::resolver::MatchingResolver;
use crate::selector::{RoutingSelector, TrustWeighting};
use crate::transport::{LocalTransport, Mailbox};
use crate::unit::ProcessingUnit;

struct RunningUnit {
    identity: HandlerIdentity,
    task: JoinHandle<()>,
}

struct SystemInner<M: Message> {
    config: NodeConfig,
    node_id: NodeId,
    directory: Directory,
    resolver: MatchingResolver,
    selector: RoutingSelector,
    dispatcher: Dispatcher<M>,
    transport: LocalTransport<M>,
    engine: PredicateEngine,
    time: Arc<dyn PhysicalTimeEffects>,
    registry: Mutex<HandlerRegistry<M>>,
    units: Mutex<Vec<RunningUnit>>,
    started: AtomicBool,
}

impl<M: Message> SystemInner<M> {
    fn stop_units(&self) -> usize {
        let units = std::mem::take(&mut *self.units.lock());
        for unit in &units {
            self.transport.close_mailbox(&unit.identity);
            unit.task.abort();
        }
        units.len()
    }
}

impl<M: Message> Drop for SystemInner<M> {
    fn drop(&mut self) {
        if self.stop_units() > 0 {
            tracing::debug!(node = %self.node_id, "Message system dropped with running units");
        }
    }
}

/// Builder for [`MessageSystem`]
pub struct MessageSystemBuilder<M: Message> {
    config: NodeConfig,
    registers: Option<Arc<dyn ReplicatedRegisterEffects<HandlerRegistration>>>,
    transport: Option<LocalTransport<M>>,
    time: Option<Arc<dyn PhysicalTimeEffects>>,
    random: Option<Arc<dyn RandomEffects>>,
    engine: Option<PredicateEngine>,
    weighting: TrustWeighting,
}

impl<M: Message> MessageSystemBuilder<M> {
    /// Replica the directory reads and writes through
    pub fn registers(
        mut self,
        registers: Arc<dyn ReplicatedRegisterEffects<HandlerRegistration>>,
    ) -> Self {
        self.registers = Some(registers);
        self
    }

    /// Transport shared with the other systems of the cluster
    pub fn transport(mut self, transport: LocalTransport<M>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Clock used for write witnesses and readiness sleeps
    pub fn time(mut self, time: Arc<dyn PhysicalTimeEffects>) -> Self {
        self.time = Some(time);
        self
    }

    /// Randomness used to break routing ties
    pub fn random(mut self, random: Arc<dyn RandomEffects>) -> Self {
        self.random = Some(random);
        self
    }

    /// Predicate engine, e.g. to share its query cache
    pub fn engine(mut self, engine: PredicateEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Tie-break curve
    pub fn weighting(mut self, weighting: TrustWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Validate the configuration and assemble the system.
    ///
    /// Without explicit registers the system gets a private single-replica
    /// store, which suits a standalone node.
    pub fn build(self) -> ContourResult<MessageSystem<M>> {
        self.config.validate()?;
        let node_id = self.config.node_id()?;

        let registers: Arc<dyn ReplicatedRegisterEffects<HandlerRegistration>> = match self
            .registers
        {
            Some(registers) => registers,
            None => {
                let cluster = MemoryRegisterCluster::<HandlerRegistration>::for_nodes([&node_id]);
                let replica = cluster
                    .replica(0)
                    .ok_or_else(|| ContourError::internal("standalone register cluster is empty"))?;
                Arc::new(replica)
            }
        };
        let time = self
            .time
            .unwrap_or_else(|| Arc::new(SystemTimeHandler::new()));
        let random = self
            .random
            .unwrap_or_else(|| Arc::new(ThreadRandomHandler::new()));
        let transport = self.transport.unwrap_or_default();
        let engine = self.engine.unwrap_or_default();

        let directory = Directory::from_config(&self.config, registers, Arc::clone(&time));
        let resolver = MatchingResolver::new(directory.clone(), engine.clone());
        let selector = RoutingSelector::new(random).with_weighting(self.weighting);
        let dispatcher = Dispatcher::new(Arc::new(transport.clone()));

        Ok(MessageSystem {
            inner: Arc::new(SystemInner {
                config: self.config,
                node_id,
                directory,
                resolver,
                selector,
                dispatcher,
                transport,
                engine,
                time,
                registry: Mutex::new(HandlerRegistry::new()),
                units: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
            }),
        })
    }
}

/// One node's content-routed message system.
///
/// Handles are cheap clones of one shared system. Dropping the last handle
/// stops the processing units and closes their mailboxes, as `shutdown` does.
pub struct MessageSystem<M: Message> {
    inner: Arc<SystemInner<M>>,
}

/// Non-owning handle held by running processing units
pub(crate) struct WeakMessageSystem<M: Message> {
    inner: Weak<SystemInner<M>>,
}

impl<M: Message> WeakMessageSystem<M> {
    /// The system, unless every owning handle is gone
    pub(crate) fn upgrade(&self) -> Option<MessageSystem<M>> {
        self.inner.upgrade().map(|inner| MessageSystem { inner })
    }
}

impl<M: Message> Clone for MessageSystem<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Message> std::fmt::Debug for MessageSystem<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSystem")
            .field("system", &self.inner.config.system_name)
            .field("node", &self.inner.node_id)
            .field("units", &self.inner.units.lock().len())
            .finish()
    }
}

impl<M: Message> MessageSystem<M> {
    /// Start building a system for `config`
    pub fn builder(config: NodeConfig) -> MessageSystemBuilder<M> {
        MessageSystemBuilder {
            config,
            registers: None,
            transport: None,
            time: None,
            random: None,
            engine: None,
            weighting: TrustWeighting::default(),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakMessageSystem<M> {
        WeakMessageSystem {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Node this system runs on
    pub fn node_id(&self) -> &NodeId {
        &self.inner.node_id
    }

    /// Configuration the system was built with
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Directory view of this node
    pub fn directory(&self) -> &Directory {
        &self.inner.directory
    }

    /// Transport carrying this system's messages
    pub fn transport(&self) -> &LocalTransport<M> {
        &self.inner.transport
    }

    /// Predicate engine used for registration and matching
    pub fn engine(&self) -> &PredicateEngine {
        &self.inner.engine
    }

    /// Register a handler; only allowed before `start`
    pub fn register(
        &self,
        pattern: Pattern,
        handler: impl MessageHandler<M> + 'static,
        unit: ProcessingUnitId,
    ) -> ContourResult<()> {
        self.ensure_not_started()?;
        self.inner.registry.lock().register(pattern, handler, unit);
        Ok(())
    }

    /// Register one handler under alternative patterns; only allowed before
    /// `start`
    pub fn register_patterns(
        &self,
        patterns: impl IntoIterator<Item = Pattern>,
        handler: impl MessageHandler<M> + 'static,
        unit: ProcessingUnitId,
    ) -> ContourResult<()> {
        self.ensure_not_started()?;
        self.inner
            .registry
            .lock()
            .register_patterns(patterns, handler, unit);
        Ok(())
    }

    /// Register every entry of `registry`; only allowed before `start`
    pub fn register_all(&self, registry: HandlerRegistry<M>) -> ContourResult<()> {
        self.ensure_not_started()?;
        self.inner.registry.lock().merge(registry);
        Ok(())
    }

    fn ensure_not_started(&self) -> ContourResult<()> {
        if self.inner.started.load(Ordering::Acquire) {
            return Err(ContourError::validation(format!(
                "{} is already started",
                self.inner.config.system_name
            )));
        }
        Ok(())
    }

    /// Compile every pattern, spawn one processing unit per unit id and
    /// publish each unit's patterns with its configured trust weight.
    ///
    /// Pattern errors are reported before anything runs. The first failed
    /// publish aborts the start: the units spawned so far are stopped and the
    /// system returns to its unstarted state, so the caller may call `start`
    /// again. Entries that did get published stay in the directory until the
    /// next successful start overwrites them. Returns the published
    /// identities.
    #[tracing::instrument(skip_all, fields(node = %self.inner.node_id))]
    pub async fn start(&self) -> ContourResult<Vec<HandlerIdentity>> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(ContourError::validation(format!(
                "{} is already started",
                self.inner.config.system_name
            )));
        }

        match self.start_units().await {
            Ok(published) => {
                tracing::info!(units = published.len(), "Message system started");
                Ok(published)
            }
            Err(err) => {
                let stopped = self.inner.stop_units();
                self.inner.started.store(false, Ordering::Release);
                tracing::warn!(stopped, error = %err, "Message system start rolled back");
                Err(err)
            }
        }
    }

    async fn start_units(&self) -> ContourResult<Vec<HandlerIdentity>> {
        let groups = self.inner.registry.lock().by_processing_unit();
        let mut prepared = Vec::with_capacity(groups.len());
        for (unit_id, entries) in groups {
            let identity = self.inner.config.processing_unit_name(&unit_id)?;
            let trust_weight = self.inner.config.trust_weight_for(unit_id.as_str());
            let unit = ProcessingUnit::new(identity, entries, &self.inner.engine)?;
            prepared.push((unit, trust_weight));
        }

        let mut published = Vec::with_capacity(prepared.len());
        for (unit, trust_weight) in prepared {
            let identity = unit.identity().clone();
            let patterns = unit.patterns();
            let mailbox = self.inner.transport.open_mailbox(&identity);
            let this = self.inner.transport.receiver(identity.clone());
            let task = unit.spawn(mailbox, this, self.downgrade());
            self.inner.units.lock().push(RunningUnit {
                identity: identity.clone(),
                task,
            });

            if let Err(err) = self
                .inner
                .directory
                .publish(&identity, patterns, trust_weight)
                .await
            {
                tracing::error!(identity = %identity, error = %err, "Failed to publish processing unit");
                return Err(err);
            }
            published.push(identity);
        }
        Ok(published)
    }

    /// Identities of the running processing units
    pub fn unit_identities(&self) -> Vec<HandlerIdentity> {
        self.inner
            .units
            .lock()
            .iter()
            .map(|u| u.identity.clone())
            .collect()
    }

    /// Open an unpublished mailbox at `{node}_{name}`, for clients that
    /// want replies delivered somewhere
    pub fn open_client(&self, name: &ProcessingUnitId) -> ContourResult<(Sender<M>, Mailbox<M>)> {
        let identity = self.inner.config.processing_unit_name(name)?;
        let mailbox = self.inner.transport.open_mailbox(&identity);
        Ok((self.inner.transport.receiver(identity), mailbox))
    }

    /// Poll the directory until `expected` identities are visible, using the
    /// configured attempt count and poll interval
    pub async fn wait_until_ready(
        &self,
        expected: impl IntoIterator<Item = HandlerIdentity>,
    ) -> bool {
        let checker = ConvergenceChecker::new(
            self.inner.directory.clone(),
            Arc::clone(&self.inner.time),
            expected,
        );
        checker
            .is_ready(
                self.inner.config.gossip_synchro_attempt_count,
                self.inner.config.gossip_time_frame(),
            )
            .await
    }

    /// Resolve and select destinations for `message`.
    ///
    /// `NoReceiverFound` when no registration matches at all.
    pub async fn route(&self, message: &M) -> ContourResult<RoutingDecision> {
        let candidates = self.inner.resolver.resolve(message).await?;
        if candidates.is_empty() {
            tracing::error!(node = %self.inner.node_id, content = %message.content(), "No receiver found for message");
            return Err(ContourError::no_receiver(message.content()));
        }

        let decision = self.inner.selector.decide(&candidates).await;
        if decision.primary.is_none() {
            tracing::warn!(
                node = %self.inner.node_id,
                secondaries = decision.secondaries.len(),
                "No primary receiver for message"
            );
        }
        Ok(decision)
    }

    /// Route `message` by content, fire-and-forget
    #[tracing::instrument(skip_all, fields(node = %self.inner.node_id))]
    pub async fn send(
        &self,
        message: M,
        sender: Option<Sender<M>>,
    ) -> ContourResult<DispatchReport> {
        let decision = self.route(&message).await?;
        self.inner.dispatcher.send(message, sender, &decision).await
    }

    /// Route `message` by content and wait for the primary's reply.
    ///
    /// `timeout` falls back to the configured request timeout.
    pub async fn send_and_await_response(
        &self,
        message: M,
        timeout: Option<Duration>,
    ) -> ContourResult<M> {
        self.ask(message, None, timeout, None).await
    }

    /// Like [`Self::send_and_await_response`], abandoned when `cancel` fires
    pub async fn send_and_await_response_cancellable(
        &self,
        message: M,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> ContourResult<M> {
        self.ask(message, None, timeout, Some(cancel)).await
    }

    #[tracing::instrument(skip_all, fields(node = %self.inner.node_id))]
    pub(crate) async fn ask(
        &self,
        message: M,
        sender: Option<Sender<M>>,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> ContourResult<M> {
        let timeout = timeout.or_else(|| self.inner.config.request_timeout());
        let decision = self.route(&message).await?;
        self.inner
            .dispatcher
            .ask(message, sender, &decision, timeout, cancel)
            .await
    }

    /// Stop every processing unit; undelivered messages are dropped
    pub fn shutdown(&self) {
        let stopped = self.inner.stop_units();
        tracing::info!(node = %self.inner.node_id, units = stopped, "Message system stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HandlerContext;
    use crate::registry::handler_fn;
    use assert_matches::assert_matches;
    use contour_core::{ConsistencyLevel, ProcessingUnitProps};
    use contour_directory::MemoryRegisterCluster;
    use crate::transport::MessageTransport;
    use contour_predicate::XmlMessage;

    fn unit(s: &str) -> ProcessingUnitId {
        ProcessingUnitId::new(s).unwrap()
    }

    fn xml(s: &str) -> XmlMessage {
        XmlMessage::from_string(s).unwrap()
    }

    fn echo() -> impl MessageHandler<XmlMessage> {
        handler_fn(|ctx: HandlerContext<XmlMessage>| async move {
            let reply = XmlMessage::from_string(format!("<echo>{}</echo>", ctx.this.address()))?;
            ctx.reply(reply).await
        })
    }

    #[tokio::test]
    async fn standalone_request_response() {
        let system = MessageSystem::<XmlMessage>::builder(NodeConfig::for_node("node1"))
            .build()
            .unwrap();
        system
            .register(Pattern::new(["/ping"]).unwrap(), echo(), unit("pinger"))
            .unwrap();
        let published = system.start().await.unwrap();
        assert_eq!(published[0].as_str(), "node1_pinger");

        let answer = system
            .send_and_await_response(xml("<ping/>"), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(answer.content(), "<echo>node1_pinger</echo>");
        system.shutdown();
    }

    #[tokio::test]
    async fn unmatched_message_is_no_receiver() {
        let system = MessageSystem::<XmlMessage>::builder(NodeConfig::for_node("node1"))
            .build()
            .unwrap();
        system
            .register(Pattern::new(["/ping"]).unwrap(), echo(), unit("pinger"))
            .unwrap();
        system.start().await.unwrap();

        assert_matches!(
            system.send(xml("<pong/>"), None).await,
            Err(ContourError::NoReceiverFound { .. })
        );
    }

    #[tokio::test]
    async fn invalid_pattern_fails_start_before_publishing() {
        let system = MessageSystem::<XmlMessage>::builder(NodeConfig::for_node("node1"))
            .build()
            .unwrap();
        system
            .register(Pattern::new(["/ping[. ="]).unwrap(), echo(), unit("broken"))
            .unwrap();
        assert_matches!(system.start().await, Err(ContourError::Validation { .. }));
        assert!(system.directory().enumerate_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn registration_closes_after_start() {
        let system = MessageSystem::<XmlMessage>::builder(NodeConfig::for_node("node1"))
            .build()
            .unwrap();
        system.start().await.unwrap();
        assert_matches!(
            system.register(Pattern::new(["/a"]).unwrap(), echo(), unit("late")),
            Err(ContourError::Validation { .. })
        );
        assert_matches!(system.start().await, Err(ContourError::Validation { .. }));
    }

    #[tokio::test]
    async fn unit_publishes_configured_trust_weight() {
        let mut config = NodeConfig::for_node("node1");
        config.set_processing_unit_props(ProcessingUnitProps::untrustworthy("shady", 5));
        let system = MessageSystem::<XmlMessage>::builder(config).build().unwrap();
        system
            .register(Pattern::new(["/a"]).unwrap(), echo(), unit("shady"))
            .unwrap();
        system.start().await.unwrap();

        let id = HandlerIdentity::new("node1_shady").unwrap();
        let registration = system.directory().get(&id).await.unwrap().unwrap();
        assert_eq!(registration.trust_weight().get(), 5);
        assert!(system.wait_until_ready([id]).await);
    }

    #[tokio::test]
    async fn multi_entry_unit_filters_by_pattern() {
        let system = MessageSystem::<XmlMessage>::builder(NodeConfig::for_node("node1"))
            .build()
            .unwrap();
        let (client, mut inbox) = system.open_client(&unit("client")).unwrap();

        let tagged = |tag: &'static str| {
            handler_fn(move |ctx: HandlerContext<XmlMessage>| async move {
                let reply = XmlMessage::from_string(format!("<{tag}/>"))?;
                ctx.reply(reply).await
            })
        };
        system
            .register(Pattern::new(["/a"]).unwrap(), tagged("from_a"), unit("multi"))
            .unwrap();
        system
            .register(Pattern::new(["/b"]).unwrap(), tagged("from_b"), unit("multi"))
            .unwrap();
        system.start().await.unwrap();

        system.send(xml("<b/>"), Some(client)).await.unwrap();
        let reply = inbox.recv().await.unwrap();
        assert_eq!(reply.message.content(), "<from_b/>");
        assert_eq!(reply.sender.unwrap().address(), "node1_multi");
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_publish_rolls_back_and_start_can_be_retried() {
        let mut config = NodeConfig::for_node("node1");
        config.write_consistency = ConsistencyLevel::All;
        let node_ids = [config.node_id().unwrap(), NodeId::new("node2").unwrap()];
        let cluster = MemoryRegisterCluster::<HandlerRegistration>::for_nodes(&node_ids);
        let transport = LocalTransport::new();
        let system = MessageSystem::<XmlMessage>::builder(config)
            .registers(Arc::new(cluster.replica(0).unwrap()))
            .transport(transport.clone())
            .build()
            .unwrap();
        system
            .register(Pattern::new(["/ping"]).unwrap(), echo(), unit("pinger"))
            .unwrap();
        let id = HandlerIdentity::new("node1_pinger").unwrap();

        cluster.partition(0);
        assert_matches!(system.start().await, Err(ContourError::DirectoryWrite { .. }));
        assert!(system.unit_identities().is_empty());
        assert!(!transport.has_mailbox(&id));

        cluster.heal(0);
        assert_eq!(system.start().await.unwrap(), vec![id.clone()]);
        assert_eq!(system.unit_identities(), vec![id.clone()]);
        assert!(system.directory().get(&id).await.unwrap().is_some());
        let answer = system
            .send_and_await_response(xml("<ping/>"), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(answer.content(), "<echo>node1_pinger</echo>");
    }

    #[tokio::test]
    async fn dropped_system_stops_answering() {
        let transport = LocalTransport::new();
        let system = MessageSystem::<XmlMessage>::builder(NodeConfig::for_node("node1"))
            .transport(transport.clone())
            .build()
            .unwrap();
        system
            .register(Pattern::new(["/ping"]).unwrap(), echo(), unit("pinger"))
            .unwrap();
        system.start().await.unwrap();
        let id = HandlerIdentity::new("node1_pinger").unwrap();
        assert!(transport.has_mailbox(&id));

        drop(system);
        assert!(!transport.has_mailbox(&id));
        assert_matches!(
            transport
                .ask(&id, xml("<ping/>"), Some(Duration::from_secs(1)))
                .await,
            Err(ContourError::Transport { .. })
        );
    }
}
