//! Contour Predicate - content predicates over structured messages
//!
//! Each message type evaluates conjuncts in its own path language: XPath 1.0
//! for [`XmlMessage`] and JSONPath for [`JsonMessage`]. The
//! [`PredicateEngine`] is the seam the router talks to; it compiles conjuncts
//! through [`Message::compile_query`] and caches the results.
//!
//! ```
//! use contour_core::Pattern;
//! use contour_predicate::{PredicateEngine, XmlMessage};
//!
//! let engine = PredicateEngine::new();
//! let message = XmlMessage::from_string("<root><value1>1</value1></root>").unwrap();
//! let pattern = Pattern::new(["/root/value1[. = 1]", "count(/root/*) = 1"]).unwrap();
//! assert!(engine.matches(&pattern, &message));
//! ```

#![forbid(unsafe_code)]

pub mod engine;
pub mod error;
pub mod json;
pub mod message;
pub mod xml;

pub use engine::{CompiledPattern, PredicateEngine, DEFAULT_QUERY_CACHE_CAPACITY};
pub use error::PredicateError;
pub use json::JsonMessage;
pub use message::Message;
pub use xml::{XmlMessage, XmlQuery};
