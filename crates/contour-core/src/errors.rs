//! Unified error system for Contour
//!
//! Every failure in the routing core is per-operation: nothing here is fatal to
//! the process. Ambiguous pattern matches are deliberately absent, they are
//! reported through `tracing` and resolved first-match.

use serde::{Deserialize, Serialize};

/// Unified error type for all Contour operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ContourError {
    /// Input rejected before any side effect took place
    #[error("Invalid: {message}")]
    Validation {
        /// Error message describing the invalid input
        message: String,
    },

    /// The replicated write could not satisfy the requested consistency
    #[error("Directory write failed for {identity}: {reason}")]
    DirectoryWrite {
        /// Directory key that was being written
        identity: String,
        /// Why the register service refused the write
        reason: String,
    },

    /// A read could not reach enough replicas for its consistency level
    #[error("Directory read failed for {key}: {reason}")]
    DirectoryRead {
        /// Directory key that was being read
        key: String,
        /// Why the read failed
        reason: String,
    },

    /// The resolver produced no candidate able to take the message
    #[error("No receiver found for message {message}")]
    NoReceiverFound {
        /// Short rendering of the unroutable message
        message: String,
    },

    /// A receiver existed but did not answer before the deadline
    #[error("Request to {receiver} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Address of the primary receiver
        receiver: String,
        /// Deadline that expired, in milliseconds
        timeout_ms: u64,
    },

    /// The caller cancelled a pending request
    #[error("Request to {receiver} was cancelled")]
    Cancelled {
        /// Address of the primary receiver
        receiver: String,
    },

    /// Outbound send attempted through a read-only sender handle
    #[error("Sender {address} is read-only and cannot be used to send")]
    ReadOnlySender {
        /// Address the read-only handle refers to
        address: String,
    },

    /// Delivery to a mailbox failed
    #[error("Transport error: {message}")]
    Transport {
        /// Error message describing the transport failure
        message: String,
    },

    /// Node configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl ContourError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a directory write failure
    pub fn directory_write(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DirectoryWrite {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    /// Create a directory read failure
    pub fn directory_read(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DirectoryRead {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a no-receiver error
    pub fn no_receiver(message: impl Into<String>) -> Self {
        Self::NoReceiverFound {
            message: message.into(),
        }
    }

    /// Create a request timeout error
    pub fn request_timeout(receiver: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            receiver: receiver.into(),
            timeout_ms,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(receiver: impl Into<String>) -> Self {
        Self::Cancelled {
            receiver: receiver.into(),
        }
    }

    /// Create a read-only sender error
    pub fn read_only_sender(address: impl Into<String>) -> Self {
        Self::ReadOnlySender {
            address: address.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable code, unique per variant
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::DirectoryWrite { .. } => "directory.write_failed",
            Self::DirectoryRead { .. } => "directory.read_failed",
            Self::NoReceiverFound { .. } => "routing.no_receiver",
            Self::RequestTimeout { .. } => "dispatch.timeout",
            Self::Cancelled { .. } => "dispatch.cancelled",
            Self::ReadOnlySender { .. } => "dispatch.read_only_sender",
            Self::Transport { .. } => "transport",
            Self::Config { .. } => "config",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Standard Result type for Contour operations
pub type Result<T> = std::result::Result<T, ContourError>;

impl From<std::io::Error> for ContourError {
    fn from(err: std::io::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<toml::de::Error> for ContourError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("Invalid TOML: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ContourError::validation("cannot publish empty pattern list");
        assert!(matches!(err, ContourError::Validation { .. }));
        assert_eq!(err.to_string(), "Invalid: cannot publish empty pattern list");
    }

    #[test]
    fn test_error_codes_are_unique() {
        let errors = [
            ContourError::validation("x"),
            ContourError::directory_write("n_a", "x"),
            ContourError::directory_read("n_a", "x"),
            ContourError::no_receiver("x"),
            ContourError::request_timeout("n_a", 10),
            ContourError::cancelled("n_a"),
            ContourError::read_only_sender("n_a"),
            ContourError::transport("x"),
            ContourError::config("x"),
            ContourError::internal("x"),
        ];

        let codes: std::collections::HashSet<_> = errors.iter().map(ContourError::code).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_timeout_and_no_receiver_are_distinct() {
        let timeout = ContourError::request_timeout("node1_billing", 250);
        let missing = ContourError::no_receiver("<root/>");
        assert_ne!(timeout.code(), missing.code());
        assert_eq!(
            timeout.to_string(),
            "Request to node1_billing timed out after 250ms"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "node.toml");
        let err = ContourError::from(io_err);
        assert!(matches!(err, ContourError::Config { .. }));
    }
}
