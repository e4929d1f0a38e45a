//! In-memory store for tests and POC.
//!
//! Writes are staged inside the transaction handle and applied to the
//! shared maps only on commit, so a dropped or failed transaction leaves
//! the store untouched — the same all-or-nothing contract the Postgres
//! backend gets from real transactions.
//!
//! Failure injection: tests can forbid writes entirely (to prove
//! validation runs before any side effect) or fail the Nth line-item
//! create (to prove header+lines atomicity).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    NewPurchaseOrder, NewPurchaseOrderLine, PurchaseOrder, PurchaseOrderLine, SupplierProduct,
};
use crate::error::StoreError;
use crate::store::{
    Page, ProcurementStore, ProcurementTx, SupplierProductFilter, SupplierProductOrder,
};

#[derive(Default)]
struct Tables {
    supplier_products: HashMap<Uuid, SupplierProduct>,
    orders: HashMap<Uuid, PurchaseOrder>,
    lines: HashMap<Uuid, PurchaseOrderLine>,
    next_order_number: u64,
}

/// Shared-state in-memory backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    forbid_writes: Arc<AtomicBool>,
    // 0 = no injected failure; N = the Nth create_line call fails.
    fail_on_line_create: Arc<AtomicU32>,
    line_creates_seen: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.tables.write().expect("lock").next_order_number = 1;
        store
    }

    /// Seed a supplier-product catalog row.
    pub fn insert_supplier_product(&self, sp: SupplierProduct) {
        self.tables
            .write()
            .expect("lock")
            .supplier_products
            .insert(sp.id, sp);
    }

    /// Any call to `begin` fails the test-visible way: `StoreError::Backend`.
    /// Used to assert that validation never reaches the store.
    pub fn forbid_writes(&self) {
        self.forbid_writes.store(true, Ordering::SeqCst);
    }

    /// Make the `n`th `create_line` call (1-based) fail.
    pub fn fail_on_line_create(&self, n: u32) {
        self.fail_on_line_create.store(n, Ordering::SeqCst);
    }

    pub fn order_count(&self) -> usize {
        self.tables.read().expect("lock").orders.len()
    }

    pub fn line_count(&self) -> usize {
        self.tables.read().expect("lock").lines.len()
    }

    pub fn lines_for_order(&self, order_id: Uuid) -> Vec<PurchaseOrderLine> {
        let tables = self.tables.read().expect("lock");
        let mut lines: Vec<_> = tables
            .lines
            .values()
            .filter(|l| l.purchase_order_id == order_id)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.created_at);
        lines
    }
}

#[async_trait]
impl ProcurementStore for MemoryStore {
    async fn query_supplier_products(
        &self,
        filter: &SupplierProductFilter,
        order: SupplierProductOrder,
        page: Page,
    ) -> Result<(Vec<SupplierProduct>, u64), StoreError> {
        let tables = self.tables.read().map_err(|e| poisoned(&e))?;

        let mut rows: Vec<SupplierProduct> = tables
            .supplier_products
            .values()
            .filter(|sp| filter.product_id.is_none_or(|id| sp.product_id == id))
            .filter(|sp| filter.supplier_id.is_none_or(|id| sp.supplier_id == id))
            .filter(|sp| {
                filter
                    .is_primary_supplier
                    .is_none_or(|p| sp.is_primary_supplier == p)
            })
            .cloned()
            .collect();

        match order {
            SupplierProductOrder::UnitCostAsc => {
                rows.sort_by(|a, b| a.unit_cost.cmp(&b.unit_cost).then(a.id.cmp(&b.id)));
            }
        }

        let total = rows.len() as u64;
        let rows = rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.rows_per_page as usize)
            .collect();
        Ok((rows, total))
    }

    async fn supplier_product_by_id(&self, id: Uuid) -> Result<SupplierProduct, StoreError> {
        let tables = self.tables.read().map_err(|e| poisoned(&e))?;
        tables
            .supplier_products
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "supplier_product",
                id,
            })
    }

    async fn purchase_order_by_id(&self, id: Uuid) -> Result<PurchaseOrder, StoreError> {
        let tables = self.tables.read().map_err(|e| poisoned(&e))?;
        tables
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "purchase_order",
                id,
            })
    }

    async fn begin(&self) -> Result<Box<dyn ProcurementTx>, StoreError> {
        if self.forbid_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(
                "writes are forbidden in this test".to_string(),
            ));
        }
        Ok(Box::new(MemoryTx {
            store: self.clone(),
            staged_orders: Vec::new(),
            staged_lines: Vec::new(),
            staged_status_updates: Vec::new(),
            closed: false,
        }))
    }
}

fn poisoned<E: std::fmt::Display>(e: &E) -> StoreError {
    StoreError::Backend(format!("lock poisoned: {e}"))
}

/// Staged transaction over the memory store.
struct MemoryTx {
    store: MemoryStore,
    staged_orders: Vec<PurchaseOrder>,
    staged_lines: Vec<PurchaseOrderLine>,
    staged_status_updates: Vec<(Uuid, Uuid)>,
    closed: bool,
}

#[async_trait]
impl ProcurementTx for MemoryTx {
    async fn create_order(&mut self, new: &NewPurchaseOrder) -> Result<PurchaseOrder, StoreError> {
        if self.closed {
            return Err(StoreError::TxClosed);
        }
        let number = {
            let mut tables = self.store.tables.write().map_err(|e| poisoned(&e))?;
            let n = tables.next_order_number;
            tables.next_order_number += 1;
            format!("PO-{n:06}")
        };
        let now = Utc::now();
        let order = PurchaseOrder {
            id: Uuid::new_v4(),
            number,
            supplier_id: new.supplier_id,
            status_id: new.status_id,
            warehouse_id: new.warehouse_id,
            location_id: new.location_id,
            currency_id: new.currency_id,
            delivery_street_id: new.delivery_street_id,
            subtotal: new.subtotal,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        self.staged_orders.push(order.clone());
        Ok(order)
    }

    async fn create_line(
        &mut self,
        new: &NewPurchaseOrderLine,
    ) -> Result<PurchaseOrderLine, StoreError> {
        if self.closed {
            return Err(StoreError::TxClosed);
        }
        let seen = self.store.line_creates_seen.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_at = self.store.fail_on_line_create.load(Ordering::SeqCst);
        if fail_at != 0 && seen == fail_at {
            return Err(StoreError::Backend(format!(
                "injected failure on line create #{seen}"
            )));
        }
        let line = PurchaseOrderLine {
            id: Uuid::new_v4(),
            purchase_order_id: new.purchase_order_id,
            supplier_product_id: new.supplier_product_id,
            status_id: new.status_id,
            quantity_ordered: new.quantity_ordered,
            unit_cost: new.unit_cost,
            discount: new.discount,
            notes: new.notes.clone(),
            created_at: Utc::now(),
        };
        self.staged_lines.push(line.clone());
        Ok(line)
    }

    async fn update_order_status(
        &mut self,
        order_id: Uuid,
        status_id: Uuid,
    ) -> Result<PurchaseOrder, StoreError> {
        if self.closed {
            return Err(StoreError::TxClosed);
        }
        // Visible-state read plus staged overlay, so an update inside the
        // same tx as the create sees the staged order.
        let mut order = if let Some(staged) = self
            .staged_orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
        {
            staged
        } else {
            self.store.purchase_order_by_id(order_id).await?
        };
        order.status_id = status_id;
        order.updated_at = Utc::now();
        self.staged_status_updates.push((order_id, status_id));
        Ok(order)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.closed = true;
        let mut tables = self.store.tables.write().map_err(|e| poisoned(&e))?;
        for order in self.staged_orders.drain(..) {
            tables.orders.insert(order.id, order);
        }
        for line in self.staged_lines.drain(..) {
            tables.lines.insert(line.id, line);
        }
        for (order_id, status_id) in self.staged_status_updates.drain(..) {
            if let Some(order) = tables.orders.get_mut(&order_id) {
                order.status_id = status_id;
                order.updated_at = Utc::now();
            } else {
                return Err(StoreError::NotFound {
                    entity: "purchase_order",
                    id: order_id,
                });
            }
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.closed = true;
        self.staged_orders.clear();
        self.staged_lines.clear();
        self.staged_status_updates.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn sp(product_id: Uuid, supplier_id: Uuid, cost: &str, primary: bool) -> SupplierProduct {
        SupplierProduct {
            id: Uuid::new_v4(),
            supplier_id,
            product_id,
            unit_cost: cost.parse().unwrap(),
            discount: Decimal::ZERO,
            is_primary_supplier: primary,
        }
    }

    fn new_order(supplier_id: Uuid) -> NewPurchaseOrder {
        NewPurchaseOrder {
            supplier_id,
            status_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            currency_id: Uuid::new_v4(),
            delivery_street_id: None,
            subtotal: Decimal::ZERO,
            created_by: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn query_orders_by_unit_cost_ascending() {
        let store = MemoryStore::new();
        let product = Uuid::new_v4();
        let supplier = Uuid::new_v4();
        store.insert_supplier_product(sp(product, supplier, "30.00", false));
        store.insert_supplier_product(sp(product, supplier, "10.00", false));
        store.insert_supplier_product(sp(product, supplier, "20.00", false));
        store.insert_supplier_product(sp(Uuid::new_v4(), supplier, "1.00", false));

        let (rows, total) = store
            .query_supplier_products(
                &SupplierProductFilter {
                    product_id: Some(product),
                    ..Default::default()
                },
                SupplierProductOrder::UnitCostAsc,
                Page::first(10),
            )
            .await
            .unwrap();

        assert_eq!(total, 3);
        let costs: Vec<String> = rows.iter().map(|r| r.unit_cost.to_string()).collect();
        assert_eq!(costs, vec!["10.00", "20.00", "30.00"]);
    }

    #[tokio::test]
    async fn uncommitted_tx_leaves_store_untouched() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.create_order(&new_order(Uuid::new_v4())).await.unwrap();
            // Dropped without commit.
        }
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn commit_applies_all_staged_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let order = tx.create_order(&new_order(Uuid::new_v4())).await.unwrap();
        tx.create_line(&NewPurchaseOrderLine {
            purchase_order_id: order.id,
            supplier_product_id: Uuid::new_v4(),
            status_id: Uuid::new_v4(),
            quantity_ordered: 5,
            unit_cost: "2.00".parse().unwrap(),
            discount: Decimal::ZERO,
            notes: None,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.order_count(), 1);
        assert_eq!(store.line_count(), 1);
        assert_eq!(store.lines_for_order(order.id).len(), 1);
    }

    #[tokio::test]
    async fn status_update_in_same_tx_sees_staged_order() {
        let store = MemoryStore::new();
        let new_status = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let order = tx.create_order(&new_order(Uuid::new_v4())).await.unwrap();
        tx.update_order_status(order.id, new_status).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.purchase_order_by_id(order.id).await.unwrap();
        assert_eq!(stored.status_id, new_status);
    }
}
