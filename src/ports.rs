//! Output Ports & Entity Modification Metadata
//!
//! Declarative metadata every handler exposes: the finite set of named
//! terminal outcomes an execution can reach, and which entities the action
//! can mutate. Both are consumed by the dispatcher and by offline
//! workflow-graph validation without executing anything.

use serde::{Deserialize, Serialize};

// ── Well-known port names ──

pub const PORT_CREATED: &str = "created";
pub const PORT_UPDATED: &str = "updated";
pub const PORT_NOT_FOUND: &str = "not_found";
pub const PORT_NO_SUPPLIER_FOUND: &str = "no_supplier_found";
pub const PORT_FAILURE: &str = "failure";

/// A declared terminal outcome of a handler invocation.
///
/// Exactly one port is reached per execution. The default port is the
/// happy path; alternate ports model expected business outcomes (e.g.
/// `no_supplier_found`), which are branches, not failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPort {
    pub name: String,
    pub description: String,
    pub is_default: bool,
}

impl OutputPort {
    /// The happy-path port. Every handler declares exactly one.
    pub fn default_port(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            is_default: true,
        }
    }

    /// An alternate (non-default) port.
    pub fn port(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            is_default: false,
        }
    }
}

/// The mutation condition an action can produce for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationEvent {
    OnCreate,
    OnUpdate,
    OnDelete,
}

/// Static declaration that a handler type can mutate a given entity under
/// a given condition. Lets workflow-graph tooling validate event wiring
/// without running anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityModification {
    pub entity: String,
    pub event: ModificationEvent,
}

impl EntityModification {
    pub fn new(entity: impl Into<String>, event: ModificationEvent) -> Self {
        Self {
            entity: entity.into(),
            event,
        }
    }
}
