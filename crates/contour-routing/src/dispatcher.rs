//! Delivery of a routed message
//!
//! Secondaries are served first, each with a read-only view of the sender.
//! The primary then gets the message with the real sender, either
//! fire-and-forget (`send`) or as a request awaiting one reply (`ask`).

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use contour_core::{ContourError, ContourResult, HandlerIdentity};

use crate::candidate::RoutingDecision;
use crate::receiver::{ReadOnlyReceiver, Sender};
use crate::transport::MessageTransport;

/// Who actually received a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Primary destination that accepted the message
    pub primary: Option<HandlerIdentity>,
    /// Secondary destinations that accepted the message
    pub secondaries: Vec<HandlerIdentity>,
    /// Secondary destinations whose delivery failed
    pub failed: Vec<HandlerIdentity>,
}

/// Sends messages to the destinations of a [`RoutingDecision`]
pub struct Dispatcher<M> {
    transport: Arc<dyn MessageTransport<M>>,
}

impl<M> Clone for Dispatcher<M> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<M> std::fmt::Debug for Dispatcher<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl<M: Clone + Send + 'static> Dispatcher<M> {
    /// Dispatcher over `transport`
    pub fn new(transport: Arc<dyn MessageTransport<M>>) -> Self {
        Self { transport }
    }

    async fn fan_out_secondaries(
        &self,
        message: &M,
        sender: &Option<Sender<M>>,
        decision: &RoutingDecision,
        report: &mut DispatchReport,
    ) {
        let read_only = sender.clone().map(ReadOnlyReceiver::wrap);
        for secondary in &decision.secondaries {
            match self
                .transport
                .tell(secondary, message.clone(), read_only.clone())
                .await
            {
                Ok(()) => report.secondaries.push(secondary.clone()),
                Err(err) => {
                    tracing::warn!(identity = %secondary, error = %err, "Secondary delivery failed");
                    report.failed.push(secondary.clone());
                }
            }
        }
    }

    /// Fire-and-forget to every destination.
    ///
    /// `NoReceiverFound` when the decision is empty. A failed primary
    /// delivery fails the call after secondaries were served.
    pub async fn send(
        &self,
        message: M,
        sender: Option<Sender<M>>,
        decision: &RoutingDecision,
    ) -> ContourResult<DispatchReport> {
        if decision.is_empty() {
            return Err(ContourError::no_receiver("no destination for message"));
        }
        let mut report = DispatchReport::default();
        self.fan_out_secondaries(&message, &sender, decision, &mut report)
            .await;

        if let Some(primary) = &decision.primary {
            self.transport.tell(primary, message, sender).await?;
            report.primary = Some(primary.clone());
        }
        Ok(report)
    }

    /// Deliver to secondaries, then ask the primary and wait for its reply.
    ///
    /// Fails with `NoReceiverFound` without a primary, `RequestTimeout` when
    /// `timeout` elapses and `Cancelled` when `cancel` fires first.
    pub async fn ask(
        &self,
        message: M,
        sender: Option<Sender<M>>,
        decision: &RoutingDecision,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> ContourResult<M> {
        let mut report = DispatchReport::default();
        self.fan_out_secondaries(&message, &sender, decision, &mut report)
            .await;

        let primary = decision
            .primary
            .as_ref()
            .ok_or_else(|| ContourError::no_receiver("no primary receiver for request"))?;
        let request = self.transport.ask(primary, message, timeout);

        match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(ContourError::cancelled(primary.as_str())),
                reply = request => reply,
            },
            None => request.await,
        }
    }
}
