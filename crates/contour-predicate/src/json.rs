//! JSON messages queried with JSONPath
//!
//! Conjuncts are RFC 9535 JSONPath queries compiled by `serde_json_path`.
//! A conjunct holds when it selects at least one node, so constraints on
//! values go into filter selectors, e.g. `$.order[?@.total > 10]` on an
//! array of orders or `$[?@.total > 10]` for an `order` member.

use serde_json_path::JsonPath;
use std::fmt;
use std::sync::Arc;

use crate::error::PredicateError;
use crate::message::Message;

/// JSON document message
#[derive(Clone, PartialEq)]
pub struct JsonMessage {
    content: Arc<str>,
    value: Arc<serde_json::Value>,
}

impl JsonMessage {
    /// Build from a JSON string, rejecting malformed documents
    pub fn from_string(content: impl Into<String>) -> Result<Self, PredicateError> {
        let content: String = content.into();
        let value = serde_json::from_str(&content)
            .map_err(|e| PredicateError::malformed(Self::KIND, e))?;
        Ok(Self {
            content: content.into(),
            value: Arc::new(value),
        })
    }

    /// Build from an already parsed value
    pub fn from_value(value: serde_json::Value) -> Self {
        Self {
            content: value.to_string().into(),
            value: Arc::new(value),
        }
    }

    /// Parsed document
    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }
}

impl fmt::Debug for JsonMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JsonMessage").field(&self.content).finish()
    }
}

impl fmt::Display for JsonMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

impl Message for JsonMessage {
    const KIND: &'static str = "json";

    type Query = JsonPath;

    fn from_content(content: impl Into<String>) -> Result<Self, PredicateError> {
        Self::from_string(content)
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn compile_query(conjunct: &str) -> Result<JsonPath, PredicateError> {
        JsonPath::parse(conjunct).map_err(|e| PredicateError::syntax(Self::KIND, conjunct, e))
    }

    fn satisfies_all(&self, queries: &[Arc<JsonPath>]) -> Result<bool, PredicateError> {
        Ok(queries
            .iter()
            .all(|query| !query.query(&self.value).is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn queries(sources: &[&str]) -> Vec<Arc<JsonPath>> {
        sources
            .iter()
            .map(|s| Arc::new(JsonMessage::compile_query(s).unwrap()))
            .collect()
    }

    #[test]
    fn rejects_malformed_content() {
        assert_matches!(
            JsonMessage::from_string("{\"a\": "),
            Err(PredicateError::MalformedMessage { kind: "json", .. })
        );
    }

    #[test]
    fn from_value_round_trips_content() {
        let msg = JsonMessage::from_value(serde_json::json!({"kind": "ping"}));
        assert_eq!(msg.content(), r#"{"kind":"ping"}"#);
        assert!(msg.satisfies_all(&queries(&["$.kind", "$[?@ == 'ping']"])).unwrap());
    }

    #[test]
    fn filters_and_functions_select_by_value() {
        let msg = JsonMessage::from_string(
            r#"{"order": {"total": 12, "currency": "EUR", "lines": [{"sku": "a1"}, {"sku": "b2"}]}}"#,
        )
        .unwrap();
        assert!(msg.satisfies_all(&queries(&["$[?@.total > 10]"])).unwrap());
        assert!(!msg.satisfies_all(&queries(&["$[?@.total > 20]"])).unwrap());
        assert!(msg
            .satisfies_all(&queries(&["$.order.lines[?@.sku == 'b2']", "$.order.currency"]))
            .unwrap());
        assert!(msg
            .satisfies_all(&queries(&["$[?length(@.lines) == 2]"]))
            .unwrap());
        assert!(!msg.satisfies_all(&queries(&["$.order.discount"])).unwrap());
    }

    #[test]
    fn invalid_paths_are_syntax_errors() {
        assert_matches!(
            JsonMessage::compile_query("$.order[?@.total >"),
            Err(PredicateError::Syntax { kind: "json", .. })
        );
        assert_matches!(
            JsonMessage::compile_query("/order/total"),
            Err(PredicateError::Syntax { .. })
        );
    }
}
