//! Execution Context
//!
//! Immutable per-invocation data handed to every handler: the acting user,
//! the triggering event's raw payload, and trace identity. Created fresh
//! per invocation, never persisted, never mutated after construction.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::delegate::DelegateEvent;
use crate::error::ActionError;

/// Per-invocation context passed to `ActionHandler::execute`.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The user the action runs on behalf of.
    pub user_id: Uuid,
    /// Raw payload of the triggering event, if the action was launched by
    /// one (e.g. a reorder-threshold breach carrying `product_id` and
    /// `quantity`). Empty for plain manual invocations.
    pub raw_data: Map<String, Value>,
    /// Unique id for this invocation, for tracing and log correlation.
    pub invocation_id: Uuid,
    /// When the invocation was triggered.
    pub triggered_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Context for a manual invocation with no triggering event.
    pub fn manual(user_id: Uuid) -> Self {
        Self {
            user_id,
            raw_data: Map::new(),
            invocation_id: Uuid::new_v4(),
            triggered_at: Utc::now(),
        }
    }

    /// Context carrying a trigger payload.
    pub fn with_raw_data(user_id: Uuid, raw_data: Map<String, Value>) -> Self {
        Self {
            user_id,
            raw_data,
            invocation_id: Uuid::new_v4(),
            triggered_at: Utc::now(),
        }
    }

    /// Context built from a delegate event (event-driven trigger path).
    /// The event's entity payload becomes the raw data.
    pub fn from_delegate(event: &DelegateEvent, user_id: Uuid) -> Self {
        let raw_data = match &event.entity {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("entity".to_string(), other.clone());
                map
            }
        };
        Self::with_raw_data(user_id, raw_data)
    }

    // ── Typed raw-data extraction ──
    //
    // Handlers that source parameters from the trigger payload use these
    // instead of reaching into the map, so absence and type mismatch come
    // back as field-attributable configuration errors.

    /// Extract a UUID field from the trigger payload.
    pub fn uuid_field(&self, field: &str) -> Result<Uuid, ActionError> {
        match self.raw_data.get(field) {
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| ActionError::config(field, "not a valid UUID")),
            Some(_) => Err(ActionError::config(field, "expected a UUID string")),
            None => Err(ActionError::config(field, "missing from trigger payload")),
        }
    }

    /// Extract an integer field from the trigger payload. Accepts JSON
    /// numbers and numeric strings (event payloads are not strongly typed).
    pub fn i64_field(&self, field: &str) -> Result<i64, ActionError> {
        match self.raw_data.get(field) {
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| ActionError::config(field, "not an integer")),
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| ActionError::config(field, "not an integer")),
            Some(_) => Err(ActionError::config(field, "expected an integer")),
            None => Err(ActionError::config(field, "missing from trigger payload")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn manual_context_has_empty_payload() {
        let ctx = ExecutionContext::manual(Uuid::new_v4());
        assert!(ctx.raw_data.is_empty());
    }

    #[test]
    fn uuid_field_extraction() {
        let id = Uuid::new_v4();
        let ctx = ExecutionContext::with_raw_data(
            Uuid::new_v4(),
            payload(&[("product_id", json!(id.to_string()))]),
        );
        assert_eq!(ctx.uuid_field("product_id").unwrap(), id);

        let err = ctx.uuid_field("warehouse_id").unwrap_err();
        assert!(err.to_string().contains("warehouse_id"));
    }

    #[test]
    fn i64_field_accepts_numbers_and_numeric_strings() {
        let ctx = ExecutionContext::with_raw_data(
            Uuid::new_v4(),
            payload(&[("quantity", json!(100)), ("reorder", json!("25"))]),
        );
        assert_eq!(ctx.i64_field("quantity").unwrap(), 100);
        assert_eq!(ctx.i64_field("reorder").unwrap(), 25);
        assert!(ctx.i64_field("missing").is_err());
    }
}
