//! Dispatcher
//!
//! The sole entry point for triggering an action, used by both the manual
//! invocation API and event-driven triggers. Lookup → validate → execute →
//! declared-port check, with structured tracing at each stage.

use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::ports::{EntityModification, OutputPort};
use crate::registry::HandlerRegistry;

/// Outcome of a dispatched invocation: the declared port that was reached
/// plus the handler's result payload.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub port: OutputPort,
    pub data: Map<String, Value>,
}

/// Declarative handler metadata, for workflow-graph tooling that needs to
/// inspect an action type without executing it.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub action_type: String,
    pub output_ports: Vec<OutputPort>,
    pub is_async: bool,
    pub supports_manual_execution: bool,
}

/// Dispatches invocations to registered handlers.
pub struct Dispatcher {
    registry: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run one action invocation.
    ///
    /// - Unknown action type is a hard configuration error.
    /// - Validation failure short-circuits before any side effect.
    /// - A handler returning a port it never declared is an invariant
    ///   violation: logged loudly and surfaced as an error, never as a
    ///   business branch.
    pub async fn dispatch(
        &self,
        action_type: &str,
        config: &[u8],
        exec: &ExecutionContext,
    ) -> Result<DispatchOutcome, ActionError> {
        let handler = self
            .registry
            .get(action_type)
            .ok_or_else(|| ActionError::UnknownAction(action_type.to_string()))?;

        let config: Value = serde_json::from_slice(config)?;

        debug!(
            action_type,
            invocation_id = %exec.invocation_id,
            user_id = %exec.user_id,
            "Validating action configuration"
        );
        handler.validate(&config)?;

        let result = handler.execute(exec, &config).await?;

        let Some(port) = handler
            .output_ports()
            .into_iter()
            .find(|p| p.name == result.output)
        else {
            error!(
                action_type,
                invocation_id = %exec.invocation_id,
                port = %result.output,
                "Handler returned an undeclared output port"
            );
            return Err(ActionError::UndeclaredPort {
                action_type: action_type.to_string(),
                port: result.output,
            });
        };

        info!(
            action_type,
            invocation_id = %exec.invocation_id,
            port = %port.name,
            "Action invocation completed"
        );
        Ok(DispatchOutcome {
            port,
            data: result.data,
        })
    }

    /// Metadata for one action type, without executing anything.
    pub fn describe(&self, action_type: &str) -> Result<ActionDescriptor, ActionError> {
        let handler = self
            .registry
            .get(action_type)
            .ok_or_else(|| ActionError::UnknownAction(action_type.to_string()))?;
        Ok(ActionDescriptor {
            action_type: action_type.to_string(),
            output_ports: handler.output_ports(),
            is_async: handler.is_async(),
            supports_manual_execution: handler.supports_manual_execution(),
        })
    }

    /// Entity modifications an action type can produce under the given
    /// configuration. Static workflow-graph metadata.
    pub fn entity_modifications(
        &self,
        action_type: &str,
        config: &[u8],
    ) -> Result<Vec<EntityModification>, ActionError> {
        let handler = self
            .registry
            .get(action_type)
            .ok_or_else(|| ActionError::UnknownAction(action_type.to_string()))?;
        let config: Value = serde_json::from_slice(config)?;
        Ok(handler.entity_modifications(&config))
    }
}
