// Copyright 2025 Cowboy AI, LLC.

//! Error types for engine operations

use thiserror::Error;

/// Errors that can occur while configuring or running the engine
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Startup validation found configuration problems
    #[error("Configuration invalid: {} issue(s): {}", issues.len(), issues.join("; "))]
    Configuration {
        /// The offending entries, one message each
        issues: Vec<String>,
    },

    /// Entity not found
    #[error("Entity not found: {kind} with id {id}")]
    EntityNotFound {
        /// Kind of entity that was looked up
        kind: String,
        /// ID that was searched for
        id: String,
    },

    /// A core invariant no longer holds; indicates a bug, aborts the run
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A coordinate space referenced by an operation is not declared
    #[error("Unknown coordinate space: {0}")]
    UnknownCoordinateSpace(String),

    /// A template or system produced output the runtime cannot commit
    #[error("Invalid expansion from {source_id}: {reason}")]
    InvalidExpansion {
        /// Template or system that produced the output
        source_id: String,
        /// Why the output was rejected
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::SerializationError(err.to_string())
    }
}

impl EngineError {
    /// Check if this error aborts startup rather than a running tick
    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Configuration { .. })
    }

    /// Check if this error indicates a core bug (fatal mid-run)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::InvariantViolation(_) | EngineError::InternalError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test error display messages
    #[test]
    fn test_error_display_messages() {
        let err = EngineError::EntityNotFound {
            kind: "npc".to_string(),
            id: "npc_00042".to_string(),
        };
        assert_eq!(err.to_string(), "Entity not found: npc with id npc_00042");

        let err = EngineError::InvariantViolation("link cache out of sync".to_string());
        assert_eq!(
            err.to_string(),
            "Invariant violation: link cache out of sync"
        );

        let err = EngineError::Configuration {
            issues: vec!["kind 'npc' has no subtypes".to_string()],
        };
        assert!(err.to_string().contains("1 issue(s)"));
        assert!(err.to_string().contains("kind 'npc' has no subtypes"));

        let err = EngineError::InvalidExpansion {
            source_id: "settlement_founding".to_string(),
            reason: "relationship endpoint missing".to_string(),
        };
        assert!(err.to_string().contains("settlement_founding"));
    }

    /// Test fatal/configuration classification helpers
    #[test]
    fn test_error_classification() {
        assert!(EngineError::Configuration { issues: vec![] }.is_configuration());
        assert!(!EngineError::Configuration { issues: vec![] }.is_fatal());

        assert!(EngineError::InvariantViolation("x".to_string()).is_fatal());
        assert!(EngineError::InternalError("x".to_string()).is_fatal());
        assert!(!EngineError::EntityNotFound {
            kind: "npc".to_string(),
            id: "1".to_string()
        }
        .is_fatal());
    }

    /// Test serde_json error conversion
    #[test]
    fn test_serde_json_conversion() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{ bad json").unwrap_err();
        let err: EngineError = serde_err.into();
        match err {
            EngineError::SerializationError(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected SerializationError"),
        }
    }
}
