//! Processing units: one mailbox loop per unit
//!
//! A unit owning a single entry runs it for every delivered message, since
//! routing already matched that entry's pattern. A unit owning several
//! entries runs each entry whose own pattern matches, and a handler shared
//! by several entries only for the first of them. Handlers run one at a time
//! in mailbox order; a failing handler is logged and the loop goes on.
//! The loop only holds its system weakly and ends once the system is gone.

use std::sync::Arc;
use tokio::task::JoinHandle;

use contour_core::{ContourError, ContourResult, HandlerIdentity};
use contour_predicate::{CompiledPattern, Message, PredicateEngine};

use crate::context::HandlerContext;
use crate::receiver::Sender;
use crate::registry::{HandlerEntry, MessageHandler};
use crate::system::{MessageSystem, WeakMessageSystem};
use crate::transport::Mailbox;

struct CompiledEntry<M: Message> {
    entry: HandlerEntry<M>,
    compiled: CompiledPattern<M>,
}

/// Handlers of one processing unit with their compiled patterns
pub struct ProcessingUnit<M: Message> {
    identity: HandlerIdentity,
    entries: Vec<CompiledEntry<M>>,
}

impl<M: Message> std::fmt::Debug for ProcessingUnit<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingUnit")
            .field("identity", &self.identity)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<M: Message> ProcessingUnit<M> {
    /// Compile every entry's pattern; fails with `Validation` on the first
    /// conjunct that does not parse
    pub fn new(
        identity: HandlerIdentity,
        entries: Vec<HandlerEntry<M>>,
        engine: &PredicateEngine,
    ) -> ContourResult<Self> {
        if entries.is_empty() {
            return Err(ContourError::validation(format!(
                "processing unit {identity} has no handlers"
            )));
        }
        let entries = entries
            .into_iter()
            .map(|entry| {
                let compiled = engine.compile::<M>(&entry.pattern)?;
                Ok(CompiledEntry { entry, compiled })
            })
            .collect::<ContourResult<Vec<_>>>()?;
        Ok(Self { identity, entries })
    }

    /// Identity the unit publishes under and receives at
    pub fn identity(&self) -> &HandlerIdentity {
        &self.identity
    }

    /// Patterns in registration order, as published
    pub fn patterns(&self) -> Vec<contour_core::Pattern> {
        self.entries.iter().map(|e| e.entry.pattern.clone()).collect()
    }

    /// Run the mailbox loop until the mailbox closes or the system is dropped
    pub(crate) fn spawn(
        self,
        mut mailbox: Mailbox<M>,
        this: Sender<M>,
        system: WeakMessageSystem<M>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(envelope) = mailbox.recv().await {
                let Some(system) = system.upgrade() else {
                    break;
                };
                self.process(envelope.message, envelope.sender, &this, &system)
                    .await;
            }
            tracing::debug!(identity = %self.identity, "Processing unit stopped");
        })
    }

    async fn process(
        &self,
        message: M,
        sender: Option<Sender<M>>,
        this: &Sender<M>,
        system: &MessageSystem<M>,
    ) {
        let single = self.entries.len() == 1;
        let mut ran: Vec<&Arc<dyn MessageHandler<M>>> = Vec::new();
        for compiled in &self.entries {
            let handler = &compiled.entry.handler;
            if ran.iter().any(|h| Arc::ptr_eq(h, handler)) {
                continue;
            }
            if !single && !compiled.compiled.matches(&message) {
                continue;
            }
            ran.push(handler);
            let ctx = HandlerContext {
                message: message.clone(),
                sender: sender.clone(),
                this: this.clone(),
                system: system.clone(),
            };
            if let Err(err) = handler.handle(ctx).await {
                tracing::error!(
                    identity = %self.identity,
                    pattern = %compiled.entry.pattern,
                    error = %err,
                    code = err.code(),
                    "Handler failed"
                );
            }
        }
    }
}
