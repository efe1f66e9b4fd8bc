//! Contour Routing - deliver messages by what they contain
//!
//! Sending a message runs three steps against the local directory view:
//!
//! 1. Resolve: every published registration whose first matching pattern
//!    holds for the message becomes a candidate, scored by conjunct count.
//! 2. Select: secondary candidates all receive the message; among primary
//!    candidates the highest score wins, with exact ties broken by a draw
//!    weighted against untrustworthy units.
//! 3. Dispatch: secondaries first, each with a read-only sender, then the
//!    primary, either fire-and-forget or as a request awaiting one reply.
//!
//! Handlers run inside processing units, one mailbox loop per unit, and are
//! wired up by a [`MessageSystem`].

#![forbid(unsafe_code)]

pub mod candidate;
pub mod context;
pub mod dispatcher;
pub mod receiver;
pub mod registry;
pub mod resolver;
pub mod selector;
pub mod system;
pub mod transport;
pub mod unit;

pub use candidate::{MatchingCandidate, RoutingDecision};
pub use context::HandlerContext;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use receiver::{CanReceiveMessage, MailboxReceiver, ReadOnlyReceiver, ReplyReceiver, Sender};
pub use registry::{handler_fn, FnHandler, HandlerEntry, HandlerRegistry, MessageHandler};
pub use resolver::MatchingResolver;
pub use selector::{weighted_index, RoutingSelector, TrustWeighting};
pub use system::{MessageSystem, MessageSystemBuilder};
pub use transport::{Envelope, LocalTransport, Mailbox, MessageTransport};
pub use unit::ProcessingUnit;

pub use tokio_util::sync::CancellationToken;
