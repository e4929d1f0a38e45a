//! Output-Port Routing & Trigger Matching
//!
//! Two pieces of workflow wiring, both data-driven:
//!
//! - `PortRouter`: after a dispatch, decides which action (if any) runs
//!   next based on the port that was reached. An unrouted port terminates
//!   the chain.
//! - `TriggerMatcher`: turns a delegate event into zero or more pending
//!   invocations, matching on `(domain, action)`. The matching rule is
//!   configuration, not code; the host wires rules at startup.
//!
//! `ChainRunner` drives dispatch → route → dispatch with a depth cap so a
//! mis-wired routing table cannot loop forever.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::delegate::{DelegateAction, DelegateEvent};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::ActionError;

/// Where a port leads: the next action type and its configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub next_action: String,
    pub config: Value,
}

/// Routing table keyed by `(action_type, port_name)`.
#[derive(Default)]
pub struct PortRouter {
    routes: HashMap<(String, String), Route>,
}

impl PortRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(
        &mut self,
        action_type: impl Into<String>,
        port: impl Into<String>,
        route: Route,
    ) {
        self.routes.insert((action_type.into(), port.into()), route);
    }

    /// The next step for a reached port, or `None` to terminate.
    pub fn resolve(&self, action_type: &str, port: &str) -> Option<&Route> {
        self.routes
            .get(&(action_type.to_string(), port.to_string()))
    }
}

/// One step of a completed chain, for the caller's audit trail.
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub action_type: String,
    pub port: String,
}

/// Result of running a chain to termination.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// Every step taken, in order. At least one.
    pub steps: Vec<ChainStep>,
    /// Outcome of the final step.
    pub last: DispatchOutcome,
}

/// Drives chained dispatches through the routing table.
pub struct ChainRunner<'a> {
    dispatcher: &'a Dispatcher,
    router: &'a PortRouter,
    max_depth: usize,
}

impl<'a> ChainRunner<'a> {
    pub const DEFAULT_MAX_DEPTH: usize = 16;

    pub fn new(dispatcher: &'a Dispatcher, router: &'a PortRouter) -> Self {
        Self {
            dispatcher,
            router,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Dispatch `action_type`, then follow routes until a port has no
    /// route. Each chained step runs under a fresh context carrying the
    /// same user and the previous step's result payload as raw data.
    pub async fn run(
        &self,
        action_type: &str,
        config: &[u8],
        exec: ExecutionContext,
    ) -> Result<ChainOutcome, ActionError> {
        let start = action_type.to_string();
        let mut current_action = start.clone();
        let mut current_config = config.to_vec();
        let mut current_exec = exec;
        let mut steps = Vec::new();

        loop {
            if steps.len() >= self.max_depth {
                return Err(ActionError::ChainTooDeep {
                    start,
                    max: self.max_depth,
                });
            }

            let outcome = self
                .dispatcher
                .dispatch(&current_action, &current_config, &current_exec)
                .await?;
            steps.push(ChainStep {
                action_type: current_action.clone(),
                port: outcome.port.name.clone(),
            });

            let Some(route) = self.router.resolve(&current_action, &outcome.port.name) else {
                debug!(
                    action_type = %current_action,
                    port = %outcome.port.name,
                    steps = steps.len(),
                    "No route for port; chain terminates"
                );
                return Ok(ChainOutcome {
                    steps,
                    last: outcome,
                });
            };

            info!(
                from = %current_action,
                port = %outcome.port.name,
                to = %route.next_action,
                "Following port route"
            );
            current_exec =
                ExecutionContext::with_raw_data(current_exec.user_id, outcome.data.clone());
            current_config = serde_json::to_vec(&route.config)?;
            current_action = route.next_action.clone();
        }
    }
}

// ── Trigger matching ──

/// Configurable rule: a delegate event matching `(domain, action)` queues
/// the named action for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRule {
    pub domain: String,
    pub action: DelegateAction,
    pub next_action: String,
    pub config: Value,
}

/// A matched rule turned into a runnable invocation.
#[derive(Debug, Clone)]
pub struct PendingInvocation {
    pub action_type: String,
    pub config: Value,
    pub exec: ExecutionContext,
}

/// Matches delegate events against trigger rules.
#[derive(Default)]
pub struct TriggerMatcher {
    rules: Vec<TriggerRule>,
}

impl TriggerMatcher {
    pub fn new(rules: Vec<TriggerRule>) -> Self {
        Self { rules }
    }

    pub fn add_rule(&mut self, rule: TriggerRule) {
        self.rules.push(rule);
    }

    /// Every invocation this event should launch, in rule order. The
    /// event's entity payload becomes each invocation's raw data, so
    /// event-sourced handlers can extract parameters from it.
    pub fn invocations_for(&self, event: &DelegateEvent, user_id: Uuid) -> Vec<PendingInvocation> {
        self.rules
            .iter()
            .filter(|r| r.domain == event.domain && r.action == event.action)
            .map(|r| PendingInvocation {
                action_type: r.next_action.clone(),
                config: r.config.clone(),
                exec: ExecutionContext::from_delegate(event, user_id),
            })
            .collect()
    }
}
