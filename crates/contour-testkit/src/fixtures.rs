//! Scenario data and handlers that record what they receive

use std::sync::Arc;
use tokio::sync::mpsc;

use contour_core::{ContourError, ContourResult, Pattern};
use contour_predicate::{Message, XmlMessage};
use contour_routing::{handler_fn, HandlerContext, MessageHandler, Sender};

/// Message of the two-node routing scenario
pub const SCENARIO_MESSAGE: &str =
    r#"<root><value1>1</value1><value2 attr="b">2</value2><value3>3</value3></root>"#;

/// Build a pattern from literal conjuncts
pub fn pattern(conjuncts: &[&str]) -> Pattern {
    match Pattern::new(conjuncts.iter().copied()) {
        Ok(pattern) => pattern,
        Err(err) => panic!("invalid test pattern {conjuncts:?}: {err}"),
    }
}

/// Patterns of `test1` on node1: a two-conjunct pattern that holds for
/// [`SCENARIO_MESSAGE`], then a single-conjunct fallback
pub fn scenario_test1_patterns() -> Vec<Pattern> {
    vec![
        pattern(&["/root/value1[.=1]", "/root/value2[@attr='b']"]),
        pattern(&["/root/value2[.=2]"]),
    ]
}

/// Same as [`scenario_test1_patterns`] but the first pattern asks for
/// `attr='a'`, so only the fallback holds for [`SCENARIO_MESSAGE`]
pub fn scenario_test1_patterns_literal() -> Vec<Pattern> {
    vec![
        pattern(&["/root/value1[.=1]", "/root/value2[@attr='a']"]),
        pattern(&["/root/value2[.=2]"]),
    ]
}

/// Pattern of `test2` on node2
pub fn scenario_test2_pattern() -> Pattern {
    pattern(&["/root/value3[.=3]"])
}

/// The scenario message
pub fn scenario_message() -> XmlMessage {
    xml(SCENARIO_MESSAGE)
}

/// Parse an XML test message
pub fn xml(content: &str) -> XmlMessage {
    match XmlMessage::from_string(content) {
        Ok(message) => message,
        Err(err) => panic!("invalid test message {content}: {err}"),
    }
}

/// One message as seen by a recording handler
pub struct Delivery<M: Message> {
    /// Address of the processing unit that ran the handler
    pub receiver: String,
    /// Delivered message
    pub message: M,
    /// Sender handle as delivered
    pub sender: Option<Sender<M>>,
}

impl<M: Message> std::fmt::Debug for Delivery<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("receiver", &self.receiver)
            .field("message", &self.message)
            .field("sender", &self.sender.as_ref().map(|s| s.address().to_string()))
            .finish()
    }
}

/// Handler forwarding every delivery to the returned receiver
pub fn recorder<M: Message>() -> (
    impl MessageHandler<M> + Clone,
    mpsc::UnboundedReceiver<Delivery<M>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = handler_fn(move |ctx: HandlerContext<M>| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(Delivery {
                receiver: ctx.this.address().to_string(),
                message: ctx.message,
                sender: ctx.sender,
            });
            Ok::<_, ContourError>(())
        }
    });
    (handler, rx)
}

/// Handler replying to every request with `respond(&request)`
pub fn responder<M, F>(respond: F) -> impl MessageHandler<M>
where
    M: Message,
    F: Fn(&HandlerContext<M>) -> ContourResult<M> + Send + Sync + 'static,
{
    let respond = Arc::new(respond);
    handler_fn(move |ctx: HandlerContext<M>| {
        let respond = Arc::clone(&respond);
        async move {
            let response = respond(&ctx)?;
            ctx.reply(response).await
        }
    })
}
