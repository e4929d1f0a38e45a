//! Error Types
//!
//! Two error enums, one per concern: `ActionError` for everything the
//! dispatcher and handlers surface, `StoreError` for the persistence layer.
//!
//! Expected business outcomes (no eligible supplier, order not found) are
//! NOT errors — handlers report those through named output ports so the
//! caller can branch on them. An `ActionError` always means the invocation
//! aborted with no partial writes.

use uuid::Uuid;

/// Errors surfaced by the dispatcher and action handlers.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Configuration failed validation. Always attributable to a field.
    #[error("invalid configuration: {field}: {message}")]
    Config { field: String, message: String },

    /// No handler is registered for the requested action type.
    #[error("unknown action type: {0}")]
    UnknownAction(String),

    /// A handler returned an output port it never declared. This is a bug
    /// in the handler, not a business outcome.
    #[error("handler {action_type} returned undeclared output port {port:?}")]
    UndeclaredPort { action_type: String, port: String },

    /// A handler was registered with a malformed port declaration.
    #[error("invalid handler registration for {action_type}: {message}")]
    Registration {
        action_type: String,
        message: String,
    },

    /// The action configuration is not valid JSON.
    #[error("configuration is not valid JSON: {0}")]
    ConfigJson(#[from] serde_json::Error),

    /// Infrastructure failure from the persistence layer.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Routing chain exceeded the configured depth cap.
    #[error("routing chain exceeded {max} steps starting from {start}")]
    ChainTooDeep { start: String, max: usize },
}

impl ActionError {
    /// Shorthand for a field-attributable configuration error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        ActionError::Config {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("entity not found: {entity} {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// Transaction already finished; no further writes are accepted.
    #[error("transaction is closed")]
    TxClosed,

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend-specific failure (lock poisoning, injected test faults).
    #[error("storage failure: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_field() {
        let err = ActionError::config("status_id", "not a valid UUID");
        assert_eq!(
            err.to_string(),
            "invalid configuration: status_id: not a valid UUID"
        );
    }

    #[test]
    fn store_error_converts_into_action_error() {
        let err: ActionError = StoreError::TxClosed.into();
        assert!(matches!(err, ActionError::Store(StoreError::TxClosed)));
    }
}
