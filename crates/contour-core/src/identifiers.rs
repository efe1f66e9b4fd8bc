//! Node, processing unit, handler and replica identifiers
//!
//! A handler identity is the flat string `{node}_{unit}`. It doubles as the
//! directory key and as the logical destination address, so it is kept as an
//! opaque string once composed.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{ContourError, Result};

/// Namespace for deriving stable replica identifiers from node ids
const REPLICA_NAMESPACE: Uuid = Uuid::from_u128(0x6c0e_5a1d_93f4_4b0e_9b7a_2f41_c3d8_e105);

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier, rejecting empty strings
            pub fn new(value: impl Into<String>) -> Result<Self> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(ContourError::validation(concat!(
                        stringify!($name),
                        " cannot be empty"
                    )));
                }
                Ok(Self(value))
            }

            /// Get the identifier string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a process (node) in the cluster
    NodeId
);

string_id!(
    /// Identifier of a processing unit, unique within its node
    ProcessingUnitId
);

string_id!(
    /// Globally unique handler identity, the directory key and destination address
    HandlerIdentity
);

impl HandlerIdentity {
    /// Compose the `{node}_{unit}` identity of a processing unit
    pub fn compose(node: &NodeId, unit: &ProcessingUnitId) -> Self {
        Self(format!("{node}_{unit}"))
    }

    /// Wrap a raw key read back from the directory.
    ///
    /// Keys come from the register service verbatim, so no validation applies.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

/// Stable per-writer identifier used to break last-writer-wins ties
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(Uuid);

impl ReplicaId {
    /// Wrap an existing UUID
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Derive the replica id of a node; the same node id always yields the same replica id
    pub fn for_node(node: &NodeId) -> Self {
        Self(Uuid::new_v5(&REPLICA_NAMESPACE, node.as_str().as_bytes()))
    }

    /// Get the underlying UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_identity_uses_node_underscore_unit_format() {
        let node = NodeId::new("node1").unwrap();
        let unit = ProcessingUnitId::new("test1").unwrap();
        assert_eq!(HandlerIdentity::compose(&node, &unit).as_str(), "node1_test1");
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(NodeId::new("").is_err());
        assert!(ProcessingUnitId::new("   ").is_err());
    }

    #[test]
    fn replica_id_is_stable_per_node() {
        let a = NodeId::new("node1").unwrap();
        let b = NodeId::new("node2").unwrap();
        assert_eq!(ReplicaId::for_node(&a), ReplicaId::for_node(&a));
        assert_ne!(ReplicaId::for_node(&a), ReplicaId::for_node(&b));
    }

    #[test]
    fn identity_serializes_as_plain_string() {
        let id = HandlerIdentity::from_key("node2_test2");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"node2_test2\"");
    }
}
