//! Procurement Domain Types
//!
//! Purchase orders, their line items, and the supplier-product catalog
//! rows the resolution step reads. Money is `rust_decimal::Decimal`
//! throughout; discounts are fractions in `[0, 1)`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain names used in delegate events.
pub const DOMAIN_PURCHASE_ORDER: &str = "purchase_order";
pub const DOMAIN_PURCHASE_ORDER_LINE: &str = "purchase_order_line_item";

/// A persisted purchase-order header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub number: String,
    pub supplier_id: Uuid,
    pub status_id: Uuid,
    pub warehouse_id: Uuid,
    pub location_id: Uuid,
    pub currency_id: Uuid,
    pub delivery_street_id: Option<Uuid>,
    pub subtotal: Decimal,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a purchase-order header.
#[derive(Debug, Clone)]
pub struct NewPurchaseOrder {
    pub supplier_id: Uuid,
    pub status_id: Uuid,
    pub warehouse_id: Uuid,
    pub location_id: Uuid,
    pub currency_id: Uuid,
    pub delivery_street_id: Option<Uuid>,
    pub subtotal: Decimal,
    pub created_by: Uuid,
}

/// A persisted purchase-order line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub supplier_product_id: Uuid,
    pub status_id: Uuid,
    pub quantity_ordered: i64,
    pub unit_cost: Decimal,
    pub discount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a line item under an existing order.
#[derive(Debug, Clone)]
pub struct NewPurchaseOrderLine {
    pub purchase_order_id: Uuid,
    pub supplier_product_id: Uuid,
    pub status_id: Uuid,
    pub quantity_ordered: i64,
    pub unit_cost: Decimal,
    pub discount: Decimal,
    pub notes: Option<String>,
}

/// A supplier-product catalog row: one supplier's offering of one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierProduct {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub product_id: Uuid,
    pub unit_cost: Decimal,
    pub discount: Decimal,
    pub is_primary_supplier: bool,
}

/// A requested line resolved against the supplier-product catalog.
///
/// Ephemeral staging data: produced during one execution, consumed when the
/// persisted line items are built, never stored directly.
#[derive(Debug, Clone)]
pub struct ResolvedLine {
    pub supplier_product_id: Uuid,
    pub supplier_id: Uuid,
    pub unit_cost: Decimal,
    pub discount: Decimal,
    pub quantity_ordered: i64,
    pub status_id: Uuid,
    pub notes: Option<String>,
}

impl ResolvedLine {
    /// Line total: `quantity * unit_cost * (1 - discount)`.
    pub fn total(&self) -> Decimal {
        Decimal::from(self.quantity_ordered) * self.unit_cost * (Decimal::ONE - self.discount)
    }
}
