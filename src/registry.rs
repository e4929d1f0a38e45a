//! Handler Registry
//!
//! Maps stable action-type strings to handler trait objects. Port
//! declaration invariants are enforced at registration time so a
//! misdeclared handler is rejected at startup, not mid-invocation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ActionError;
use crate::handler::ActionHandler;

/// String key → handler instance. Built once at startup, then read-only.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its declared action type.
    ///
    /// Rejected when the action type is already taken, or the port
    /// declaration is malformed: empty set, duplicate names, or not
    /// exactly one default.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> Result<(), ActionError> {
        let action_type = handler.action_type();

        if self.handlers.contains_key(action_type) {
            return Err(ActionError::Registration {
                action_type: action_type.to_string(),
                message: "action type already registered".to_string(),
            });
        }

        let ports = handler.output_ports();
        if ports.is_empty() {
            return Err(ActionError::Registration {
                action_type: action_type.to_string(),
                message: "handler declares no output ports".to_string(),
            });
        }
        let defaults = ports.iter().filter(|p| p.is_default).count();
        if defaults != 1 {
            return Err(ActionError::Registration {
                action_type: action_type.to_string(),
                message: format!("expected exactly one default port, found {defaults}"),
            });
        }
        let mut names: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(ActionError::Registration {
                action_type: action_type.to_string(),
                message: "duplicate output port names".to_string(),
            });
        }

        self.handlers.insert(action_type, handler);
        Ok(())
    }

    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action_type).cloned()
    }

    /// Registered action types, sorted, for offline tooling enumeration.
    pub fn action_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
