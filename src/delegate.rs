//! Delegate Events
//!
//! Post-commit notifications describing domain mutations. Delivery is
//! synchronous and best-effort: a subscriber error is logged and never
//! unwinds the (already committed) transaction. Consumers must be
//! idempotent against duplicate or missed events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// The kind of mutation a delegate event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegateAction {
    Created,
    Updated,
    Deleted,
}

/// A post-commit notification of one domain mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateEvent {
    /// Domain the mutated entity belongs to (e.g. `purchase_order`).
    pub domain: String,
    pub action: DelegateAction,
    /// Serialized entity after the mutation.
    pub entity: Value,
    pub occurred_at: DateTime<Utc>,
}

impl DelegateEvent {
    pub fn new(domain: impl Into<String>, action: DelegateAction, entity: Value) -> Self {
        Self {
            domain: domain.into(),
            action,
            entity,
            occurred_at: Utc::now(),
        }
    }
}

/// What a subscriber wants to hear about. `None` / empty means "all".
#[derive(Debug, Clone, Default)]
pub struct DelegateFilter {
    pub domain: Option<String>,
    pub actions: Vec<DelegateAction>,
}

impl DelegateFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: DelegateAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn matches(&self, event: &DelegateEvent) -> bool {
        if let Some(domain) = &self.domain {
            if domain != &event.domain {
                return false;
            }
        }
        self.actions.is_empty() || self.actions.contains(&event.action)
    }
}

/// A delegate-event consumer. Errors are logged, never propagated.
#[async_trait]
pub trait DelegateSubscriber: Send + Sync {
    /// Name for log attribution.
    fn name(&self) -> &str;

    /// Which events this subscriber receives.
    fn interest(&self) -> DelegateFilter {
        DelegateFilter::all()
    }

    async fn on_event(&self, event: &DelegateEvent) -> anyhow::Result<()>;
}

/// Fans one event out to every matching subscriber, in registration order.
#[derive(Default)]
pub struct DelegateBus {
    subscribers: Vec<Arc<dyn DelegateSubscriber>>,
}

impl DelegateBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn DelegateSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Deliver an event to all matching subscribers. Best-effort: a failing
    /// subscriber is logged at `warn` and the rest still run. The mutation
    /// this event describes has already committed; nothing here can or
    /// should undo it.
    pub async fn publish(&self, event: &DelegateEvent) {
        debug!(
            domain = %event.domain,
            action = ?event.action,
            subscribers = self.subscribers.len(),
            "Publishing delegate event"
        );
        for subscriber in &self.subscribers {
            if !subscriber.interest().matches(event) {
                continue;
            }
            if let Err(e) = subscriber.on_event(event).await {
                warn!(
                    subscriber = subscriber.name(),
                    domain = %event.domain,
                    action = ?event.action,
                    error = %e,
                    "Delegate subscriber failed; event delivery is best-effort"
                );
            }
        }
    }
}
