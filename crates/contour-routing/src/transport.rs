//! Addressable delivery between handlers
//!
//! The dispatcher only needs `tell` and `ask` against a handler identity;
//! [`LocalTransport`] provides both over in-process mailboxes. Several
//! message systems can share one `LocalTransport` to form an in-process
//! cluster. Delivery is at most once.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use contour_core::{ContourError, ContourResult, HandlerIdentity};

use crate::receiver::{MailboxReceiver, ReplyReceiver, Sender};

/// A delivered message and the handle it came from
pub struct Envelope<M> {
    /// Payload
    pub message: M,
    /// Who to answer, if anyone
    pub sender: Option<Sender<M>>,
}

impl<M: fmt::Debug> fmt::Debug for Envelope<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("message", &self.message)
            .field("sender", &self.sender.as_ref().map(|s| s.address().to_string()))
            .finish()
    }
}

/// Receiving end of a handler mailbox
pub type Mailbox<M> = mpsc::UnboundedReceiver<Envelope<M>>;

/// Delivery primitives consumed by the dispatcher
#[async_trait]
pub trait MessageTransport<M>: Send + Sync {
    /// Deliver without waiting for an answer
    async fn tell(
        &self,
        address: &HandlerIdentity,
        message: M,
        sender: Option<Sender<M>>,
    ) -> ContourResult<()>;

    /// Deliver and wait for the first reply.
    ///
    /// `RequestTimeout` when `timeout` elapses first. Never retried.
    async fn ask(
        &self,
        address: &HandlerIdentity,
        message: M,
        timeout: Option<Duration>,
    ) -> ContourResult<M>;
}

struct Registry<M> {
    mailboxes: RwLock<HashMap<HandlerIdentity, mpsc::UnboundedSender<Envelope<M>>>>,
    next_reply: AtomicU64,
}

/// In-process mailboxes keyed by handler identity
pub struct LocalTransport<M> {
    inner: Arc<Registry<M>>,
}

impl<M> Clone for LocalTransport<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> Default for LocalTransport<M> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Registry {
                mailboxes: RwLock::new(HashMap::new()),
                next_reply: AtomicU64::new(1),
            }),
        }
    }
}

impl<M> fmt::Debug for LocalTransport<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransport")
            .field("mailboxes", &self.inner.mailboxes.read().len())
            .finish()
    }
}

impl<M: Send + 'static> LocalTransport<M> {
    /// Transport with no mailboxes
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the mailbox for `identity`, replacing any previous one
    pub fn open_mailbox(&self, identity: &HandlerIdentity) -> Mailbox<M> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self
            .inner
            .mailboxes
            .write()
            .insert(identity.clone(), tx)
            .is_some()
        {
            tracing::debug!(identity = %identity, "Replaced existing mailbox");
        }
        rx
    }

    /// Close the mailbox for `identity`; later sends to it fail
    pub fn close_mailbox(&self, identity: &HandlerIdentity) {
        self.inner.mailboxes.write().remove(identity);
    }

    /// Whether a mailbox is open for `identity`
    pub fn has_mailbox(&self, identity: &HandlerIdentity) -> bool {
        self.inner.mailboxes.read().contains_key(identity)
    }

    /// Sender handle addressing the mailbox of `identity`
    pub fn receiver(&self, identity: HandlerIdentity) -> Sender<M> {
        Arc::new(MailboxReceiver::new(identity, Arc::new(self.clone())))
    }

    fn deliver(&self, address: &HandlerIdentity, envelope: Envelope<M>) -> ContourResult<()> {
        let mailboxes = self.inner.mailboxes.read();
        let tx = mailboxes
            .get(address)
            .ok_or_else(|| ContourError::transport(format!("No mailbox at {address}")))?;
        tx.send(envelope)
            .map_err(|_| ContourError::transport(format!("Mailbox at {address} is closed")))
    }
}

#[async_trait]
impl<M: Send + 'static> MessageTransport<M> for LocalTransport<M> {
    async fn tell(
        &self,
        address: &HandlerIdentity,
        message: M,
        sender: Option<Sender<M>>,
    ) -> ContourResult<()> {
        self.deliver(address, Envelope { message, sender })
    }

    async fn ask(
        &self,
        address: &HandlerIdentity,
        message: M,
        timeout: Option<Duration>,
    ) -> ContourResult<M> {
        let id = self.inner.next_reply.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = ReplyReceiver::channel(format!("reply-{id}"));
        self.deliver(
            address,
            Envelope {
                message,
                sender: Some(Arc::new(reply)),
            },
        )?;

        let dropped = || ContourError::transport(format!("{address} dropped the request"));
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply.map_err(|_| dropped()),
                Err(_) => Err(ContourError::request_timeout(
                    address.as_str(),
                    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                )),
            },
            None => rx.await.map_err(|_| dropped()),
        }
    }
}
