//! Predicate engine errors

use contour_core::ContourError;

/// Errors raised while compiling conjuncts or reading message content
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredicateError {
    /// A conjunct is not a valid query in the message's path language
    #[error("Invalid {kind} query {query:?}: {reason}")]
    Syntax {
        /// Document kind whose language rejected the conjunct
        kind: &'static str,
        /// The offending conjunct
        query: String,
        /// Parser diagnostic
        reason: String,
    },

    /// A conjunct parsed but could not be evaluated, e.g. an unknown function
    #[error("Cannot evaluate {kind} query {query:?}: {reason}")]
    Evaluation {
        /// Document kind the query ran against
        kind: &'static str,
        /// The failing conjunct
        query: String,
        /// Evaluator diagnostic
        reason: String,
    },

    /// Message content could not be parsed as its document type
    #[error("Malformed {kind} message: {reason}")]
    MalformedMessage {
        /// Document kind, e.g. `xml` or `json`
        kind: &'static str,
        /// Parser diagnostic
        reason: String,
    },
}

impl PredicateError {
    pub(crate) fn syntax(kind: &'static str, query: &str, reason: impl ToString) -> Self {
        Self::Syntax {
            kind,
            query: query.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn evaluation(kind: &'static str, query: &str, reason: impl ToString) -> Self {
        Self::Evaluation {
            kind,
            query: query.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(kind: &'static str, reason: impl ToString) -> Self {
        Self::MalformedMessage {
            kind,
            reason: reason.to_string(),
        }
    }
}

impl From<PredicateError> for ContourError {
    fn from(err: PredicateError) -> Self {
        ContourError::validation(err.to_string())
    }
}
