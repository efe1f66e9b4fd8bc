//! Routable message types
//!
//! A message owns its textual content, validated when the message is built.
//! Each document type brings its own path language: the type compiles
//! conjunct strings into its [`Message::Query`] and runs them over its
//! parsed content.

use std::fmt;
use std::sync::Arc;

use crate::error::PredicateError;

/// Content that path queries can be evaluated against
pub trait Message: Clone + fmt::Debug + Send + Sync + 'static {
    /// Document kind used in diagnostics and to key compiled queries
    const KIND: &'static str;

    /// One compiled conjunct
    type Query: fmt::Debug + Send + Sync + 'static;

    /// Parse and validate `content`
    fn from_content(content: impl Into<String>) -> Result<Self, PredicateError>;

    /// Raw content as received
    fn content(&self) -> &str;

    /// Compile one conjunct, rejecting anything the path language does not
    /// accept
    fn compile_query(conjunct: &str) -> Result<Self::Query, PredicateError>;

    /// Whether every query holds on this message
    fn satisfies_all(&self, queries: &[Arc<Self::Query>]) -> Result<bool, PredicateError>;
}
