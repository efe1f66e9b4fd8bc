//! Content predicates published by handlers
//!
//! A [`Pattern`] is a conjunction: every conjunct must select something in a
//! message for the pattern to match. Conjunct strings are opaque here; the
//! predicate engine gives them meaning.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{ContourError, Result};

/// A conjunction of path conditions over a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern {
    conjuncts: Vec<String>,
    #[serde(default)]
    is_secondary: bool,
}

impl Pattern {
    /// Create a primary pattern; an empty conjunct list is rejected
    pub fn new<I, S>(conjuncts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let conjuncts: Vec<String> = conjuncts.into_iter().map(Into::into).collect();
        if conjuncts.is_empty() {
            return Err(ContourError::validation("conjuncts cannot be empty"));
        }
        if conjuncts.iter().any(|c| c.trim().is_empty()) {
            return Err(ContourError::validation("conjuncts cannot be blank"));
        }
        Ok(Self {
            conjuncts,
            is_secondary: false,
        })
    }

    /// Mark the owner of this pattern as an observer-only destination
    pub fn secondary(mut self) -> Self {
        self.is_secondary = true;
        self
    }

    /// Conjunct strings in declaration order
    pub fn conjuncts(&self) -> &[String] {
        &self.conjuncts
    }

    /// Whether messages matched by this pattern are delivered without a response path
    pub fn is_secondary(&self) -> bool {
        self.is_secondary
    }

    /// Matching score: more conjuncts means a more specific pattern
    pub fn score(&self) -> usize {
        self.conjuncts.len()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.conjuncts.join(" AND "))?;
        if self.is_secondary {
            write!(f, " (secondary)")?;
        }
        Ok(())
    }
}
