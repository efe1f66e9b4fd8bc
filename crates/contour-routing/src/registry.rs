//! Handler registration
//!
//! Deployment code lists `(pattern, handler, processing unit)` entries
//! explicitly. Entries of one processing unit share a mailbox and one
//! published registration.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use contour_core::{ContourResult, Pattern, ProcessingUnitId};
use contour_predicate::Message;

use crate::context::HandlerContext;

/// Logic run for a delivered message
#[async_trait]
pub trait MessageHandler<M: Message>: Send + Sync {
    /// Handle one message
    async fn handle(&self, ctx: HandlerContext<M>) -> ContourResult<()>;
}

/// Adapter turning an async closure into a [`MessageHandler`]
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a handler
pub fn handler_fn<M, F, Fut>(f: F) -> FnHandler<F>
where
    M: Message,
    F: Fn(HandlerContext<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ContourResult<()>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<M, F, Fut> MessageHandler<M> for FnHandler<F>
where
    M: Message,
    F: Fn(HandlerContext<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ContourResult<()>> + Send + 'static,
{
    async fn handle(&self, ctx: HandlerContext<M>) -> ContourResult<()> {
        (self.f)(ctx).await
    }
}

/// One registered handler
pub struct HandlerEntry<M: Message> {
    /// When the handler applies
    pub pattern: Pattern,
    /// What runs
    pub handler: Arc<dyn MessageHandler<M>>,
    /// Mailbox the handler runs in
    pub unit: ProcessingUnitId,
}

impl<M: Message> Clone for HandlerEntry<M> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            handler: Arc::clone(&self.handler),
            unit: self.unit.clone(),
        }
    }
}

impl<M: Message> fmt::Debug for HandlerEntry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("pattern", &self.pattern)
            .field("unit", &self.unit)
            .finish_non_exhaustive()
    }
}

/// Ordered list of handler entries
pub struct HandlerRegistry<M: Message> {
    entries: Vec<HandlerEntry<M>>,
}

impl<M: Message> Default for HandlerRegistry<M> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<M: Message> fmt::Debug for HandlerRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.entries).finish()
    }
}

impl<M: Message> HandlerRegistry<M> {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handler` under `pattern` in processing unit `unit`
    pub fn register(
        &mut self,
        pattern: Pattern,
        handler: impl MessageHandler<M> + 'static,
        unit: ProcessingUnitId,
    ) -> &mut Self {
        self.register_shared(pattern, Arc::new(handler), unit)
    }

    /// Add one handler under several alternative patterns; it runs at most
    /// once per message, for the first of them that matches
    pub fn register_patterns(
        &mut self,
        patterns: impl IntoIterator<Item = Pattern>,
        handler: impl MessageHandler<M> + 'static,
        unit: ProcessingUnitId,
    ) -> &mut Self {
        let handler: Arc<dyn MessageHandler<M>> = Arc::new(handler);
        for pattern in patterns {
            self.register_shared(pattern, Arc::clone(&handler), unit.clone());
        }
        self
    }

    /// Add an already shared handler
    pub fn register_shared(
        &mut self,
        pattern: Pattern,
        handler: Arc<dyn MessageHandler<M>>,
        unit: ProcessingUnitId,
    ) -> &mut Self {
        tracing::debug!(unit = %unit, %pattern, "Registered handler");
        self.entries.push(HandlerEntry {
            pattern,
            handler,
            unit,
        });
        self
    }

    /// Append every entry of `other`
    pub fn merge(&mut self, other: HandlerRegistry<M>) -> &mut Self {
        self.entries.extend(other.entries);
        self
    }

    /// Entries in registration order
    pub fn entries(&self) -> &[HandlerEntry<M>] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries grouped by processing unit; units in order of first
    /// registration, entries in registration order
    pub fn by_processing_unit(&self) -> Vec<(ProcessingUnitId, Vec<HandlerEntry<M>>)> {
        let mut groups: Vec<(ProcessingUnitId, Vec<HandlerEntry<M>>)> = Vec::new();
        for entry in &self.entries {
            match groups.iter_mut().find(|(unit, _)| *unit == entry.unit) {
                Some((_, group)) => group.push(entry.clone()),
                None => groups.push((entry.unit.clone(), vec![entry.clone()])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contour_predicate::XmlMessage;

    fn noop() -> impl MessageHandler<XmlMessage> {
        handler_fn(|_ctx: HandlerContext<XmlMessage>| async {
            Ok::<_, contour_core::ContourError>(())
        })
    }

    fn unit(s: &str) -> ProcessingUnitId {
        ProcessingUnitId::new(s).unwrap()
    }

    fn pattern(c: &str) -> Pattern {
        Pattern::new([c]).unwrap()
    }

    #[test]
    fn groups_by_unit_in_first_registration_order() {
        let mut registry = HandlerRegistry::<XmlMessage>::new();
        registry
            .register(pattern("/b"), noop(), unit("beta"))
            .register(pattern("/a1"), noop(), unit("alpha"))
            .register(pattern("/b2"), noop(), unit("beta"));

        let groups = registry.by_processing_unit();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, unit("beta"));
        let patterns: Vec<_> = groups[0].1.iter().map(|e| e.pattern.clone()).collect();
        assert_eq!(patterns, vec![pattern("/b"), pattern("/b2")]);
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn alternative_patterns_share_one_handler() {
        let mut registry = HandlerRegistry::<XmlMessage>::new();
        registry.register_patterns([pattern("/a"), pattern("/b")], noop(), unit("u"));

        let entries = registry.entries();
        assert_eq!(entries.len(), 2);
        assert!(Arc::ptr_eq(&entries[0].handler, &entries[1].handler));
    }

    #[test]
    fn merge_appends_entries() {
        let mut first = HandlerRegistry::<XmlMessage>::new();
        first.register(pattern("/a"), noop(), unit("a"));
        let mut second = HandlerRegistry::<XmlMessage>::new();
        second.register(pattern("/b"), noop(), unit("b"));

        first.merge(second);
        assert_eq!(first.len(), 2);
        assert_eq!(first.entries()[1].unit, unit("b"));
        assert!(!first.is_empty());
    }
}
