//! Update Purchase Order Status Action
//!
//! Moves an existing purchase-order header to a new status. The order id
//! comes from the configuration or, when sourced from an event, from the
//! trigger payload. A missing order is the `not_found` port — a branch
//! for the workflow, not an error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::delegate::DelegateBus;
use crate::domain::DOMAIN_PURCHASE_ORDER;
use crate::error::{ActionError, StoreError};
use crate::handler::{ActionHandler, ActionResult};
use crate::ports::{
    EntityModification, ModificationEvent, OutputPort, PORT_FAILURE, PORT_NOT_FOUND, PORT_UPDATED,
};
use crate::store::ProcurementStore;
use crate::tx::UnitOfWork;

pub const ACTION_TYPE: &str = "update_purchase_order_status";

#[derive(Debug, Deserialize)]
struct Config {
    status_id: String,
    /// Order to update. May be omitted when `source_from_event` is set,
    /// in which case the trigger payload must carry `purchase_order_id`.
    #[serde(default)]
    purchase_order_id: Option<String>,
    #[serde(default)]
    source_from_event: bool,
}

impl Config {
    fn parse(config: &Value) -> Result<Config, ActionError> {
        serde_json::from_value(config.clone())
            .map_err(|e| ActionError::config("config", e.to_string()))
    }
}

pub struct UpdateOrderStatusHandler {
    store: Arc<dyn ProcurementStore>,
    bus: Arc<DelegateBus>,
}

impl UpdateOrderStatusHandler {
    pub fn new(store: Arc<dyn ProcurementStore>, bus: Arc<DelegateBus>) -> Self {
        Self { store, bus }
    }
}

#[async_trait]
impl ActionHandler for UpdateOrderStatusHandler {
    fn action_type(&self) -> &'static str {
        ACTION_TYPE
    }

    fn validate(&self, config: &Value) -> Result<(), ActionError> {
        let parsed = Config::parse(config)?;

        parsed
            .status_id
            .parse::<Uuid>()
            .map_err(|_| ActionError::config("status_id", "not a valid UUID"))?;

        match (&parsed.purchase_order_id, parsed.source_from_event) {
            (None, false) => Err(ActionError::config(
                "purchase_order_id",
                "required unless sourced from an event",
            )),
            (Some(id), _) => id
                .parse::<Uuid>()
                .map(|_| ())
                .map_err(|_| ActionError::config("purchase_order_id", "not a valid UUID")),
            (None, true) => Ok(()),
        }
    }

    async fn execute(
        &self,
        exec: &ExecutionContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError> {
        let parsed = Config::parse(config)?;
        let status_id: Uuid = parsed
            .status_id
            .parse()
            .map_err(|_| ActionError::config("status_id", "not a valid UUID"))?;

        let order_id: Uuid = match &parsed.purchase_order_id {
            Some(id) => id
                .parse()
                .map_err(|_| ActionError::config("purchase_order_id", "not a valid UUID"))?,
            None => match exec.uuid_field("purchase_order_id") {
                Ok(id) => id,
                Err(e) => {
                    return Ok(ActionResult::port(PORT_FAILURE)
                        .with("reason", json!(format!("trigger payload: {e}"))));
                }
            },
        };

        let mut uow = UnitOfWork::begin(self.store.as_ref(), self.bus.clone()).await?;
        let order = match uow.update_order_status(order_id, status_id).await {
            Ok(order) => order,
            Err(StoreError::NotFound { .. }) => {
                uow.abort().await?;
                return Ok(ActionResult::port(PORT_NOT_FOUND)
                    .with("purchase_order_id", json!(order_id.to_string())));
            }
            Err(e) => return Err(e.into()),
        };
        uow.commit().await?;

        info!(
            invocation_id = %exec.invocation_id,
            purchase_order_id = %order.id,
            status_id = %status_id,
            "Purchase order status updated"
        );

        Ok(ActionResult::port(PORT_UPDATED)
            .with("purchase_order_id", json!(order.id.to_string()))
            .with("status_id", json!(status_id.to_string())))
    }

    fn output_ports(&self) -> Vec<OutputPort> {
        vec![
            OutputPort::default_port(PORT_UPDATED, "Status change committed"),
            OutputPort::port(PORT_NOT_FOUND, "No purchase order with the given id"),
            OutputPort::port(PORT_FAILURE, "Bad trigger payload"),
        ]
    }

    fn entity_modifications(&self, _config: &Value) -> Vec<EntityModification> {
        vec![EntityModification::new(
            DOMAIN_PURCHASE_ORDER,
            ModificationEvent::OnUpdate,
        )]
    }
}
