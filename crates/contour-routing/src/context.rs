//! What a handler sees when it runs

use std::fmt;
use std::time::Duration;

use contour_core::{ContourError, ContourResult};
use contour_predicate::Message;

use crate::dispatcher::DispatchReport;
use crate::receiver::Sender;
use crate::system::MessageSystem;

/// A delivered message together with its reply path and the owning system
pub struct HandlerContext<M: Message> {
    /// The delivered message
    pub message: M,
    /// Handle of whoever sent it; read-only for secondary deliveries
    pub sender: Option<Sender<M>>,
    /// Handle of the processing unit running the handler
    pub this: Sender<M>,
    /// System the processing unit belongs to
    pub system: MessageSystem<M>,
}

impl<M: Message> Clone for HandlerContext<M> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            sender: self.sender.clone(),
            this: self.this.clone(),
            system: self.system.clone(),
        }
    }
}

impl<M: Message> fmt::Debug for HandlerContext<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("message", &self.message)
            .field("sender", &self.sender.as_ref().map(|s| s.address().to_string()))
            .field("this", &self.this.address())
            .finish_non_exhaustive()
    }
}

impl<M: Message> HandlerContext<M> {
    /// Answer the sender, naming this unit as the reply's sender.
    ///
    /// Fails with `ReadOnlySender` when this was a secondary delivery.
    pub async fn reply(&self, response: M) -> ContourResult<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ContourError::transport("message has no sender to reply to"))?;
        sender.tell(response, Some(self.this.clone())).await
    }

    /// Route a new message by content, with this unit as sender
    pub async fn send(&self, message: M) -> ContourResult<DispatchReport> {
        self.system.send(message, Some(self.this.clone())).await
    }

    /// Route a new request by content and wait for the answer; secondaries
    /// see this unit as a read-only sender
    pub async fn ask(&self, message: M, timeout: Option<Duration>) -> ContourResult<M> {
        self.system
            .ask(message, Some(self.this.clone()), timeout, None)
            .await
    }
}
