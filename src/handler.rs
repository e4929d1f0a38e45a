//! Action Handler Contract
//!
//! An action handler is a named unit of business logic invoked by the
//! dispatcher. Handlers are registered as trait objects keyed by a stable
//! type string; adding a new action type means one new impl plus one
//! registry entry, never a dispatcher change.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::ports::{EntityModification, OutputPort};

/// Result of a handler execution: the output port reached plus a payload
/// keyed for the caller (new ids, computed totals, diagnostics).
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    /// Name of the output port reached. Must be one the handler declares.
    pub output: String,
    /// Result payload returned to the caller.
    pub data: Map<String, Value>,
}

impl ActionResult {
    /// Start a result terminating on the named port.
    pub fn port(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            data: Map::new(),
        }
    }

    /// Attach a payload entry.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// A named unit of business logic invocable by the dispatcher.
///
/// Contract:
/// - `validate` is pure over the configuration: it must not touch the
///   database, and it must fail with a field-attributable error.
/// - `execute` returns `Err` only for infrastructure failures. Expected
///   business outcomes (no eligible supplier, entity missing) terminate on
///   a named alternate port instead, so the caller can branch on them.
/// - Every path through `execute` ends on a port listed by `output_ports`.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Stable string key this handler is registered under.
    fn action_type(&self) -> &'static str;

    /// Fail-fast configuration check. No database access.
    fn validate(&self, config: &Value) -> Result<(), ActionError>;

    /// Run the action. One transaction, one output port.
    async fn execute(
        &self,
        exec: &ExecutionContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError>;

    /// The finite set of ports this handler can terminate on, including
    /// alternate and failure paths. Exactly one must be the default.
    fn output_ports(&self) -> Vec<OutputPort>;

    /// Which entities this action can mutate, given its configuration.
    /// Static metadata for workflow-graph validation.
    fn entity_modifications(&self, config: &Value) -> Vec<EntityModification>;

    /// Whether the action runs asynchronously relative to its trigger.
    fn is_async(&self) -> bool {
        false
    }

    /// Whether the action may be invoked directly from the manual API.
    fn supports_manual_execution(&self) -> bool {
        true
    }
}
