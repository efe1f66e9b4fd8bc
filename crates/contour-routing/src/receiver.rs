//! Sender handles attached to delivered messages
//!
//! A handler replies, forwards or ignores the sender it receives. Secondary
//! destinations receive a [`ReadOnlyReceiver`], which names the wrapped
//! sender but refuses every outbound send.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use contour_core::{ContourError, ContourResult, HandlerIdentity};

use crate::transport::MessageTransport;

/// Something a message can be sent to
#[async_trait]
pub trait CanReceiveMessage<M>: Send + Sync + fmt::Debug {
    /// Logical address of the receiver
    fn address(&self) -> &str;

    /// Fire-and-forget delivery
    async fn tell(&self, message: M, sender: Option<Sender<M>>) -> ContourResult<()>;

    /// Request/response delivery
    async fn ask(&self, message: M, timeout: Option<Duration>) -> ContourResult<M>;
}

/// Shared sender handle
pub type Sender<M> = Arc<dyn CanReceiveMessage<M>>;

/// A handler mailbox reached through a transport
pub struct MailboxReceiver<M> {
    address: HandlerIdentity,
    transport: Arc<dyn MessageTransport<M>>,
}

impl<M> MailboxReceiver<M> {
    /// Handle for the mailbox at `address`
    pub fn new(address: HandlerIdentity, transport: Arc<dyn MessageTransport<M>>) -> Self {
        Self { address, transport }
    }
}

impl<M> fmt::Debug for MailboxReceiver<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MailboxReceiver").field(&self.address).finish()
    }
}

#[async_trait]
impl<M: Send + 'static> CanReceiveMessage<M> for MailboxReceiver<M> {
    fn address(&self) -> &str {
        self.address.as_str()
    }

    async fn tell(&self, message: M, sender: Option<Sender<M>>) -> ContourResult<()> {
        self.transport.tell(&self.address, message, sender).await
    }

    async fn ask(&self, message: M, timeout: Option<Duration>) -> ContourResult<M> {
        self.transport.ask(&self.address, message, timeout).await
    }
}

/// One-shot handle that completes a pending `ask`
pub struct ReplyReceiver<M> {
    address: String,
    slot: Mutex<Option<oneshot::Sender<M>>>,
}

impl<M> ReplyReceiver<M> {
    /// Reply handle plus the receiving end awaited by the asker
    pub fn channel(address: impl Into<String>) -> (Self, oneshot::Receiver<M>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                address: address.into(),
                slot: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl<M> fmt::Debug for ReplyReceiver<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReplyReceiver").field(&self.address).finish()
    }
}

#[async_trait]
impl<M: Send + 'static> CanReceiveMessage<M> for ReplyReceiver<M> {
    fn address(&self) -> &str {
        &self.address
    }

    async fn tell(&self, message: M, _sender: Option<Sender<M>>) -> ContourResult<()> {
        let tx = self
            .slot
            .lock()
            .take()
            .ok_or_else(|| ContourError::transport(format!("{} already answered", self.address)))?;
        tx.send(message)
            .map_err(|_| ContourError::transport(format!("{} is no longer waiting", self.address)))
    }

    async fn ask(&self, _message: M, _timeout: Option<Duration>) -> ContourResult<M> {
        Err(ContourError::transport(format!(
            "{} accepts a single reply, not requests",
            self.address
        )))
    }
}

/// Sender handle that can be inspected but not used
pub struct ReadOnlyReceiver<M> {
    inner: Sender<M>,
}

impl<M> ReadOnlyReceiver<M> {
    /// Wrap `inner`
    pub fn new(inner: Sender<M>) -> Self {
        Self { inner }
    }

    /// Wrap `inner` as a shared handle
    pub fn wrap(inner: Sender<M>) -> Sender<M>
    where
        M: Send + 'static,
    {
        Arc::new(Self::new(inner))
    }
}

impl<M> fmt::Debug for ReadOnlyReceiver<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadOnlyReceiver").field(&self.inner.address()).finish()
    }
}

#[async_trait]
impl<M: Send + 'static> CanReceiveMessage<M> for ReadOnlyReceiver<M> {
    fn address(&self) -> &str {
        self.inner.address()
    }

    async fn tell(&self, _message: M, _sender: Option<Sender<M>>) -> ContourResult<()> {
        Err(ContourError::read_only_sender(self.address()))
    }

    async fn ask(&self, _message: M, _timeout: Option<Duration>) -> ContourResult<M> {
        Err(ContourError::read_only_sender(self.address()))
    }
}
