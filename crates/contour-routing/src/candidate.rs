//! Per-message routing candidates and decisions

use contour_core::{HandlerIdentity, TrustWeight};

/// A handler whose registration matched a message.
///
/// Recomputed on every send; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingCandidate {
    /// Handler identity, also its address
    pub identity: HandlerIdentity,
    /// Conjunct count of the first matching pattern
    pub score: usize,
    /// Distrust penalty published with the registration
    pub trust_weight: TrustWeight,
    /// Whether the matching pattern is observer-only
    pub is_secondary: bool,
}

/// Where one message goes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Destination with a response path, if any primary matched
    pub primary: Option<HandlerIdentity>,
    /// Observer destinations, all of which receive the message
    pub secondaries: Vec<HandlerIdentity>,
}

impl RoutingDecision {
    /// Whether nobody receives the message
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.secondaries.is_empty()
    }
}
