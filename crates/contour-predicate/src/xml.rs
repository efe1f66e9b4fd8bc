//! XML messages queried with XPath 1.0
//!
//! Documents are parsed with `sxd-document` and conjuncts evaluated with
//! `sxd-xpath`, so the full XPath 1.0 expression language is available:
//! node tests, the core function library, arithmetic and boolean logic.
//!
//! A conjunct holds when its value converts to `true` under XPath's
//! `boolean()` rules. For the usual location path that means it selects at
//! least one node.

use std::fmt;
use std::sync::Arc;

use sxd_document::{dom::Document, parser, Package};
use sxd_xpath::{Context, Factory, Value, XPath};

use crate::error::PredicateError;
use crate::message::Message;

/// A conjunct checked to be valid XPath 1.0.
///
/// `sxd-xpath` expressions are not `Send`, so the checked source is what
/// gets shared and the expression is rebuilt for each evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlQuery {
    source: String,
}

impl XmlQuery {
    /// Check that `source` is a valid XPath expression
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        build(source)?;
        Ok(Self {
            source: source.to_string(),
        })
    }

    /// The conjunct as written
    pub fn source(&self) -> &str {
        &self.source
    }

    fn holds<'d>(
        &self,
        document: &Document<'d>,
        context: &Context<'d>,
    ) -> Result<bool, PredicateError> {
        let xpath = build(&self.source)?;
        let value = xpath
            .evaluate(context, document.root())
            .map_err(|e| PredicateError::evaluation(XmlMessage::KIND, &self.source, e))?;
        Ok(match value {
            Value::Boolean(holds) => holds,
            Value::Number(n) => n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Nodeset(nodes) => nodes.size() > 0,
        })
    }
}

impl fmt::Display for XmlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn build(source: &str) -> Result<XPath, PredicateError> {
    Factory::new()
        .build(source)
        .map_err(|e| PredicateError::syntax(XmlMessage::KIND, source, e))?
        .ok_or_else(|| PredicateError::syntax(XmlMessage::KIND, source, "empty expression"))
}

fn parse_document(content: &str) -> Result<Package, PredicateError> {
    parser::parse(content).map_err(|e| PredicateError::malformed(XmlMessage::KIND, e))
}

/// XML document message
#[derive(Clone, PartialEq, Eq)]
pub struct XmlMessage {
    content: Arc<str>,
}

impl XmlMessage {
    /// Build from an XML string, rejecting malformed documents
    pub fn from_string(content: impl Into<String>) -> Result<Self, PredicateError> {
        let content: String = content.into();
        parse_document(&content)?;
        Ok(Self {
            content: content.into(),
        })
    }
}

impl fmt::Debug for XmlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("XmlMessage").field(&self.content).finish()
    }
}

impl fmt::Display for XmlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

impl Message for XmlMessage {
    const KIND: &'static str = "xml";

    type Query = XmlQuery;

    fn from_content(content: impl Into<String>) -> Result<Self, PredicateError> {
        Self::from_string(content)
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn compile_query(conjunct: &str) -> Result<XmlQuery, PredicateError> {
        XmlQuery::parse(conjunct)
    }

    fn satisfies_all(&self, queries: &[Arc<XmlQuery>]) -> Result<bool, PredicateError> {
        let package = parse_document(&self.content)?;
        let document = package.as_document();
        let context = Context::new();
        for query in queries {
            if !query.holds(&document, &context)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
