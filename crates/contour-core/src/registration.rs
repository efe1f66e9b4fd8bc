//! The replicated value stored per handler identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

use crate::errors::{ContourError, Result};
use crate::pattern::Pattern;

/// Distrust penalty used only to bias tie-breaks; 1 means fully trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TrustWeight(NonZeroU32);

impl TrustWeight {
    /// Weight of a fully trusted handler
    pub const TRUSTED: Self = Self(NonZeroU32::MIN);

    /// Create a trust weight; zero is rejected
    pub fn new(weight: u32) -> Result<Self> {
        NonZeroU32::new(weight)
            .map(Self)
            .ok_or_else(|| ContourError::validation("trust weight must be positive"))
    }

    /// Raw weight value
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Whether the handler is fully trusted
    pub fn is_trusted(self) -> bool {
        self == Self::TRUSTED
    }
}

impl Default for TrustWeight {
    fn default() -> Self {
        Self::TRUSTED
    }
}

impl TryFrom<u32> for TrustWeight {
    type Error = ContourError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TrustWeight> for u32 {
    fn from(weight: TrustWeight) -> Self {
        weight.get()
    }
}

impl fmt::Display for TrustWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a handler publishes under its identity.
///
/// The registration is replaced wholesale on republish; predicate lists are
/// never merged incrementally. Patterns are OR-ed: the handler matches if any
/// of them matches, and publish order decides which one scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRegistration {
    patterns: Vec<Pattern>,
    trust_weight: TrustWeight,
}

impl HandlerRegistration {
    /// Create a registration; an empty pattern list is rejected
    pub fn new(patterns: Vec<Pattern>, trust_weight: TrustWeight) -> Result<Self> {
        if patterns.is_empty() {
            return Err(ContourError::validation(
                "cannot distribute empty pattern list",
            ));
        }
        Ok(Self {
            patterns,
            trust_weight,
        })
    }

    /// Patterns in publish order
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Trust weight of the publishing handler
    pub fn trust_weight(&self) -> TrustWeight {
        self.trust_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_trust_weight_is_rejected() {
        assert!(TrustWeight::new(0).is_err());
        assert!(serde_json::from_str::<TrustWeight>("0").is_err());
        assert_eq!(serde_json::from_str::<TrustWeight>("3").unwrap().get(), 3);
    }

    #[test]
    fn default_weight_is_trusted() {
        assert!(TrustWeight::default().is_trusted());
        assert!(!TrustWeight::new(2).unwrap().is_trusted());
    }

    #[test]
    fn empty_registration_is_rejected() {
        let err = HandlerRegistration::new(Vec::new(), TrustWeight::TRUSTED).unwrap_err();
        assert!(matches!(err, ContourError::Validation { .. }));
    }

    #[test]
    fn registration_keeps_publish_order() {
        let first = Pattern::new(["/a"]).unwrap();
        let second = Pattern::new(["/b", "/c"]).unwrap();
        let registration =
            HandlerRegistration::new(vec![first.clone(), second.clone()], TrustWeight::TRUSTED)
                .unwrap();
        assert_eq!(registration.patterns(), &[first, second]);
    }
}
