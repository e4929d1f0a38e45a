//! Persistence Traits
//!
//! The action subsystem talks to storage exclusively through these traits,
//! enabling pluggable backends: `MemoryStore` for tests and POC, Postgres
//! for production (behind the `database` feature).
//!
//! Read-side queries follow the filter/order/page shape of the surrounding
//! entity SDK: a typed filter struct, an order descriptor, a page
//! descriptor, and a `(rows, total_count)` return.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    NewPurchaseOrder, NewPurchaseOrderLine, PurchaseOrder, PurchaseOrderLine, SupplierProduct,
};
use crate::error::StoreError;

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

// ── Read-side query descriptors ──

/// Typed filter for supplier-product lookups.
#[derive(Debug, Clone, Default)]
pub struct SupplierProductFilter {
    pub product_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub is_primary_supplier: Option<bool>,
}

/// Sort field for supplier-product queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplierProductOrder {
    /// Ascending unit cost; ties broken by id for determinism.
    UnitCostAsc,
}

/// Page descriptor: 1-based page number and rows per page.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub number: u32,
    pub rows_per_page: u32,
}

impl Page {
    pub fn first(rows_per_page: u32) -> Self {
        Self {
            number: 1,
            rows_per_page,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number.saturating_sub(1)) * u64::from(self.rows_per_page)
    }
}

// ── Store traits ──

/// Root persistence handle for the procurement action subsystem.
#[async_trait]
pub trait ProcurementStore: Send + Sync {
    /// Read-side lookup against the supplier-product catalog.
    /// Returns the matching page of rows plus the total match count.
    async fn query_supplier_products(
        &self,
        filter: &SupplierProductFilter,
        order: SupplierProductOrder,
        page: Page,
    ) -> Result<(Vec<SupplierProduct>, u64), StoreError>;

    async fn supplier_product_by_id(&self, id: Uuid) -> Result<SupplierProduct, StoreError>;

    async fn purchase_order_by_id(&self, id: Uuid) -> Result<PurchaseOrder, StoreError>;

    /// Open a transaction. All writes inside one handler invocation go
    /// through the returned handle and commit exactly once, or not at all.
    async fn begin(&self) -> Result<Box<dyn ProcurementTx>, StoreError>;
}

/// Transaction-scoped writes. Dropping the handle without `commit`
/// discards every staged write (rollback).
#[async_trait]
pub trait ProcurementTx: Send {
    async fn create_order(&mut self, new: &NewPurchaseOrder) -> Result<PurchaseOrder, StoreError>;

    async fn create_line(
        &mut self,
        new: &NewPurchaseOrderLine,
    ) -> Result<PurchaseOrderLine, StoreError>;

    async fn update_order_status(
        &mut self,
        order_id: Uuid,
        status_id: Uuid,
    ) -> Result<PurchaseOrder, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Explicit rollback. Equivalent to dropping the handle; provided for
    /// callers that want the discard visible in the control flow.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
