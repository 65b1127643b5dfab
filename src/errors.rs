/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for lock operations
pub type Result<T> = std::result::Result<T, LockError>;

/// Registry protocol errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum RegistryError {
    #[error("Release of key {key} without an outstanding reference")]
    #[diagnostic(
        code(registry::protocol_violation),
        help("Every get() must be paired with exactly one release(). This is a double release or a release without a matching get.")
    )]
    ProtocolViolation { key: String },
}

/// Invalid construction arguments
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ConfigurationError {
    #[error("Invalid shard amount: {0}")]
    #[diagnostic(
        code(config::invalid_shard_amount),
        help("Shard amount must be a power of two greater than 1, or left unset for the default.")
    )]
    InvalidShardAmount(usize),

    #[error("Pool capacity {requested} exceeds maximum of {max}")]
    #[diagnostic(
        code(config::pool_too_large),
        help("Lower max_pool_size. Idle pooled locks are retained for the lifetime of the keyed lock.")
    )]
    PoolTooLarge { requested: usize, max: usize },
}

/// Unified lock error type with miette diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum LockError {
    #[error("Timed out after {waited_ms}ms waiting for lock")]
    #[diagnostic(
        code(lock::timeout),
        help("The acquisition was abandoned; no lock or registry reference is held.")
    )]
    Timeout { waited_ms: u64 },

    #[error("Lock has been torn down")]
    #[diagnostic(
        code(lock::closed),
        help("teardown() was called on this lock. Torn-down locks cannot be acquired.")
    )]
    Closed,

    #[error("Registry error: {0}")]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    #[diagnostic(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violation_serialization() {
        let err = RegistryError::ProtocolViolation {
            key: "\"orders\"".to_string(),
        };

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("protocol_violation"));

        let back: RegistryError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_lock_error_from_registry() {
        let err: LockError = RegistryError::ProtocolViolation {
            key: "7".to_string(),
        }
        .into();

        assert!(matches!(err, LockError::Registry(_)));
        assert!(err.to_string().contains("without an outstanding reference"));
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = ConfigurationError::InvalidShardAmount(3);
        assert_eq!(
            err.code().map(|c| c.to_string()),
            Some("config::invalid_shard_amount".to_string())
        );
    }
}
