//! Create Purchase Order Action
//!
//! Creates a purchase-order header plus line items in one transaction.
//! Line items are resolved against the supplier-product catalog: an
//! explicit supplier-product reference wins; otherwise the primary
//! supplier product for the product is taken (cheapest first), falling
//! back to any supplier product when none is flagged primary.
//!
//! Expected business outcomes are ports, not errors:
//! - `created` — header and all lines committed.
//! - `no_supplier_found` — some product has no supplier product at all.
//! - `failure` — bad trigger payload, dangling reference, or line items
//!   resolving to conflicting suppliers.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::delegate::DelegateBus;
use crate::domain::{
    NewPurchaseOrder, NewPurchaseOrderLine, ResolvedLine, SupplierProduct,
    DOMAIN_PURCHASE_ORDER, DOMAIN_PURCHASE_ORDER_LINE,
};
use crate::error::{ActionError, StoreError};
use crate::handler::{ActionHandler, ActionResult};
use crate::ports::{
    EntityModification, ModificationEvent, OutputPort, PORT_CREATED, PORT_FAILURE,
    PORT_NO_SUPPLIER_FOUND,
};
use crate::store::{Page, ProcurementStore, SupplierProductFilter, SupplierProductOrder};
use crate::tx::UnitOfWork;

pub const ACTION_TYPE: &str = "create_purchase_order";

/// Handler configuration. Opaque JSON authored per workflow step.
#[derive(Debug, Deserialize)]
struct Config {
    status_id: String,
    line_item_status_id: String,
    warehouse_id: String,
    location_id: String,
    currency_id: String,
    #[serde(default)]
    delivery_street_id: Option<String>,
    /// Explicit header supplier. When absent the supplier is taken from
    /// the first resolved line item.
    #[serde(default)]
    supplier_id: Option<String>,
    /// When true, one line item is sourced from the trigger payload
    /// (`product_id` + `quantity`).
    #[serde(default)]
    source_from_event: bool,
    #[serde(default)]
    line_items: Vec<LineConfig>,
}

#[derive(Debug, Deserialize)]
struct LineConfig {
    /// Product to resolve through the catalog. Ignored when
    /// `supplier_product_id` is given.
    #[serde(default)]
    product_id: Option<String>,
    /// Explicit catalog reference; skips resolution.
    #[serde(default)]
    supplier_product_id: Option<String>,
    quantity_ordered: i64,
    /// Discount override as a fraction in `[0, 1)`. Defaults to the
    /// catalog row's discount.
    #[serde(default)]
    discount: Option<Decimal>,
    #[serde(default)]
    notes: Option<String>,
}

/// Config after identifier parsing. Built only after `validate` passed.
struct ParsedConfig {
    status_id: Uuid,
    line_item_status_id: Uuid,
    warehouse_id: Uuid,
    location_id: Uuid,
    currency_id: Uuid,
    delivery_street_id: Option<Uuid>,
    supplier_id: Option<Uuid>,
    source_from_event: bool,
    line_items: Vec<LineConfig>,
}

/// One requested line before catalog resolution.
struct LineRequest {
    product_id: Option<Uuid>,
    supplier_product_id: Option<Uuid>,
    quantity_ordered: i64,
    discount: Option<Decimal>,
    notes: Option<String>,
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, ActionError> {
    value
        .parse()
        .map_err(|_| ActionError::config(field, "not a valid UUID"))
}

impl Config {
    fn parse(config: &Value) -> Result<Config, ActionError> {
        serde_json::from_value(config.clone())
            .map_err(|e| ActionError::config("config", e.to_string()))
    }

    fn resolve_ids(self) -> Result<ParsedConfig, ActionError> {
        Ok(ParsedConfig {
            status_id: parse_uuid("status_id", &self.status_id)?,
            line_item_status_id: parse_uuid("line_item_status_id", &self.line_item_status_id)?,
            warehouse_id: parse_uuid("warehouse_id", &self.warehouse_id)?,
            location_id: parse_uuid("location_id", &self.location_id)?,
            currency_id: parse_uuid("currency_id", &self.currency_id)?,
            delivery_street_id: self
                .delivery_street_id
                .as_deref()
                .map(|v| parse_uuid("delivery_street_id", v))
                .transpose()?,
            supplier_id: self
                .supplier_id
                .as_deref()
                .map(|v| parse_uuid("supplier_id", v))
                .transpose()?,
            source_from_event: self.source_from_event,
            line_items: self.line_items,
        })
    }
}

/// The `create_purchase_order` action handler.
pub struct CreatePurchaseOrderHandler {
    store: Arc<dyn ProcurementStore>,
    bus: Arc<DelegateBus>,
}

impl CreatePurchaseOrderHandler {
    pub fn new(store: Arc<dyn ProcurementStore>, bus: Arc<DelegateBus>) -> Self {
        Self { store, bus }
    }

    /// Collect line requests from config, plus one sourced from the
    /// trigger payload when configured. Trigger payload problems are a
    /// `failure`-port outcome, not an error.
    fn collect_requests(
        &self,
        config: &ParsedConfig,
        exec: &ExecutionContext,
    ) -> Result<Result<Vec<LineRequest>, ActionResult>, ActionError> {
        let mut requests = Vec::with_capacity(config.line_items.len() + 1);

        if config.source_from_event {
            let product_id = match exec.uuid_field("product_id") {
                Ok(id) => id,
                Err(e) => return Ok(Err(failure(format!("trigger payload: {e}")))),
            };
            let quantity = match exec.i64_field("quantity") {
                Ok(q) => q,
                Err(e) => return Ok(Err(failure(format!("trigger payload: {e}")))),
            };
            if quantity <= 0 {
                return Ok(Err(failure(format!(
                    "trigger payload: quantity must be positive, got {quantity}"
                ))));
            }
            requests.push(LineRequest {
                product_id: Some(product_id),
                supplier_product_id: None,
                quantity_ordered: quantity,
                discount: None,
                notes: None,
            });
        }

        for (index, line) in config.line_items.iter().enumerate() {
            let field = format!("line_items[{index}]");
            let product_id = line
                .product_id
                .as_deref()
                .map(|v| parse_uuid(&format!("{field}.product_id"), v))
                .transpose()?;
            let supplier_product_id = line
                .supplier_product_id
                .as_deref()
                .map(|v| parse_uuid(&format!("{field}.supplier_product_id"), v))
                .transpose()?;
            requests.push(LineRequest {
                product_id,
                supplier_product_id,
                quantity_ordered: line.quantity_ordered,
                discount: line.discount,
                notes: line.notes.clone(),
            });
        }

        Ok(Ok(requests))
    }

    /// Resolve one request against the catalog. `Ok(Err(result))` is a
    /// terminal business outcome (`no_supplier_found` / `failure`).
    async fn resolve_request(
        &self,
        request: &LineRequest,
        status_id: Uuid,
    ) -> Result<Result<ResolvedLine, ActionResult>, ActionError> {
        let catalog_row = if let Some(sp_id) = request.supplier_product_id {
            match self.store.supplier_product_by_id(sp_id).await {
                Ok(row) => row,
                Err(StoreError::NotFound { .. }) => {
                    return Ok(Err(failure(format!(
                        "supplier product {sp_id} does not exist"
                    ))));
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            // validate() guarantees product_id is present when no explicit
            // supplier product is given.
            let product_id = request.product_id.ok_or_else(|| {
                ActionError::config("line_items", "line has neither product nor supplier product")
            })?;
            match self.lookup_catalog(product_id).await? {
                Some(row) => row,
                None => {
                    return Ok(Err(ActionResult::port(PORT_NO_SUPPLIER_FOUND)
                        .with("product_id", json!(product_id.to_string()))));
                }
            }
        };

        Ok(Ok(ResolvedLine {
            supplier_product_id: catalog_row.id,
            supplier_id: catalog_row.supplier_id,
            unit_cost: catalog_row.unit_cost,
            discount: request.discount.unwrap_or(catalog_row.discount),
            quantity_ordered: request.quantity_ordered,
            status_id,
            notes: request.notes.clone(),
        }))
    }

    /// Primary supplier product first, cheapest wins; fall back to any
    /// supplier product under the same ordering. Deterministic: unit cost
    /// ascending with id tie-break.
    async fn lookup_catalog(&self, product_id: Uuid) -> Result<Option<SupplierProduct>, ActionError> {
        let primary = SupplierProductFilter {
            product_id: Some(product_id),
            is_primary_supplier: Some(true),
            ..Default::default()
        };
        let (rows, _) = self
            .store
            .query_supplier_products(&primary, SupplierProductOrder::UnitCostAsc, Page::first(1))
            .await?;
        if let Some(row) = rows.into_iter().next() {
            return Ok(Some(row));
        }

        let any = SupplierProductFilter {
            product_id: Some(product_id),
            ..Default::default()
        };
        let (rows, _) = self
            .store
            .query_supplier_products(&any, SupplierProductOrder::UnitCostAsc, Page::first(1))
            .await?;
        Ok(rows.into_iter().next())
    }
}

fn failure(reason: impl Into<String>) -> ActionResult {
    let reason: String = reason.into();
    ActionResult::port(PORT_FAILURE).with("reason", json!(reason))
}

#[async_trait]
impl ActionHandler for CreatePurchaseOrderHandler {
    fn action_type(&self) -> &'static str {
        ACTION_TYPE
    }

    fn validate(&self, config: &Value) -> Result<(), ActionError> {
        let parsed = Config::parse(config)?;

        if !parsed.source_from_event && parsed.line_items.is_empty() {
            return Err(ActionError::config(
                "line_items",
                "at least one line item is required unless sourced from an event",
            ));
        }

        for (index, line) in parsed.line_items.iter().enumerate() {
            let field = format!("line_items[{index}]");
            if line.product_id.is_none() && line.supplier_product_id.is_none() {
                return Err(ActionError::config(
                    field,
                    "either product_id or supplier_product_id is required",
                ));
            }
            if let Some(id) = line.product_id.as_deref() {
                parse_uuid(&format!("{field}.product_id"), id)?;
            }
            if let Some(id) = line.supplier_product_id.as_deref() {
                parse_uuid(&format!("{field}.supplier_product_id"), id)?;
            }
            if line.quantity_ordered <= 0 {
                return Err(ActionError::config(
                    format!("{field}.quantity_ordered"),
                    format!("must be positive, got {}", line.quantity_ordered),
                ));
            }
            if let Some(discount) = line.discount {
                if discount < Decimal::ZERO || discount >= Decimal::ONE {
                    return Err(ActionError::config(
                        format!("{field}.discount"),
                        "must be a fraction in [0, 1)",
                    ));
                }
            }
        }

        // Identifier format checks, still without touching the store.
        parsed.resolve_ids().map(|_| ())
    }

    async fn execute(
        &self,
        exec: &ExecutionContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError> {
        let config = Config::parse(config)?.resolve_ids()?;

        let requests = match self.collect_requests(&config, exec)? {
            Ok(requests) => requests,
            Err(terminal) => return Ok(terminal),
        };

        // Resolve every requested line before opening a transaction.
        let mut resolved: Vec<ResolvedLine> = Vec::with_capacity(requests.len());
        for request in &requests {
            match self
                .resolve_request(request, config.line_item_status_id)
                .await?
            {
                Ok(line) => resolved.push(line),
                Err(terminal) => return Ok(terminal),
            }
        }

        // Single-supplier invariant: every line must agree with the header
        // supplier (explicit, or taken from the first resolved line).
        let supplier_id = match config.supplier_id.or(resolved.first().map(|l| l.supplier_id)) {
            Some(id) => id,
            None => return Ok(failure("no line items resolved and no supplier configured")),
        };
        for (index, line) in resolved.iter().enumerate() {
            if line.supplier_id != supplier_id {
                return Ok(failure(format!(
                    "line {index} resolves to supplier {}, order supplier is {supplier_id}",
                    line.supplier_id
                )));
            }
        }

        let subtotal: Decimal = resolved.iter().map(ResolvedLine::total).sum();

        debug!(
            invocation_id = %exec.invocation_id,
            supplier_id = %supplier_id,
            lines = resolved.len(),
            %subtotal,
            "Resolved purchase order; opening transaction"
        );

        // Header first, then lines in input order, one transaction.
        let mut uow = UnitOfWork::begin(self.store.as_ref(), self.bus.clone()).await?;
        let order = uow
            .create_order(&NewPurchaseOrder {
                supplier_id,
                status_id: config.status_id,
                warehouse_id: config.warehouse_id,
                location_id: config.location_id,
                currency_id: config.currency_id,
                delivery_street_id: config.delivery_street_id,
                subtotal,
                created_by: exec.user_id,
            })
            .await?;

        let mut line_ids = Vec::with_capacity(resolved.len());
        for line in &resolved {
            let created = uow
                .create_line(&NewPurchaseOrderLine {
                    purchase_order_id: order.id,
                    supplier_product_id: line.supplier_product_id,
                    status_id: line.status_id,
                    quantity_ordered: line.quantity_ordered,
                    unit_cost: line.unit_cost,
                    discount: line.discount,
                    notes: line.notes.clone(),
                })
                .await?;
            line_ids.push(created.id.to_string());
        }

        uow.commit().await?;

        info!(
            invocation_id = %exec.invocation_id,
            purchase_order_id = %order.id,
            number = %order.number,
            lines = line_ids.len(),
            "Purchase order created"
        );

        Ok(ActionResult::port(PORT_CREATED)
            .with("purchase_order_id", json!(order.id.to_string()))
            .with("order_number", json!(order.number))
            .with("supplier_id", json!(supplier_id.to_string()))
            .with("line_item_ids", json!(line_ids))
            .with("subtotal", json!(subtotal.to_string())))
    }

    fn output_ports(&self) -> Vec<OutputPort> {
        vec![
            OutputPort::default_port(PORT_CREATED, "Order and all line items committed"),
            OutputPort::port(
                PORT_NO_SUPPLIER_FOUND,
                "A requested product has no supplier product in the catalog",
            ),
            OutputPort::port(
                PORT_FAILURE,
                "Bad trigger payload, dangling reference, or supplier conflict",
            ),
        ]
    }

    fn entity_modifications(&self, _config: &Value) -> Vec<EntityModification> {
        vec![
            EntityModification::new(DOMAIN_PURCHASE_ORDER, ModificationEvent::OnCreate),
            EntityModification::new(DOMAIN_PURCHASE_ORDER_LINE, ModificationEvent::OnCreate),
        ]
    }
}
