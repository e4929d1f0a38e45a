//! Postgres store backend.
//!
//! Runtime-checked `sqlx::query` throughout: the `procure` schema is
//! created by migrations that may not exist at compile time, so the
//! compile-time macros are off the table.
//!
//! Transactions come straight from the pool; dropping a `PgTx` without
//! commit rolls back via sqlx's drop semantics. Isolation stays at the
//! pool default (read committed) — each action owns a narrow write set
//! and does not depend on concurrent snapshots.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::{
    NewPurchaseOrder, NewPurchaseOrderLine, PurchaseOrder, PurchaseOrderLine, SupplierProduct,
};
use crate::error::StoreError;
use crate::store::{
    Page, ProcurementStore, ProcurementTx, SupplierProductFilter, SupplierProductOrder,
};

/// Postgres-backed `ProcurementStore`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SupplierProductRow {
    id: Uuid,
    supplier_id: Uuid,
    product_id: Uuid,
    unit_cost: rust_decimal::Decimal,
    discount: rust_decimal::Decimal,
    is_primary_supplier: bool,
}

impl From<SupplierProductRow> for SupplierProduct {
    fn from(r: SupplierProductRow) -> Self {
        SupplierProduct {
            id: r.id,
            supplier_id: r.supplier_id,
            product_id: r.product_id,
            unit_cost: r.unit_cost,
            discount: r.discount,
            is_primary_supplier: r.is_primary_supplier,
        }
    }
}

#[derive(FromRow)]
struct PurchaseOrderRow {
    id: Uuid,
    number: String,
    supplier_id: Uuid,
    status_id: Uuid,
    warehouse_id: Uuid,
    location_id: Uuid,
    currency_id: Uuid,
    delivery_street_id: Option<Uuid>,
    subtotal: rust_decimal::Decimal,
    created_by: Uuid,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<PurchaseOrderRow> for PurchaseOrder {
    fn from(r: PurchaseOrderRow) -> Self {
        PurchaseOrder {
            id: r.id,
            number: r.number,
            supplier_id: r.supplier_id,
            status_id: r.status_id,
            warehouse_id: r.warehouse_id,
            location_id: r.location_id,
            currency_id: r.currency_id,
            delivery_street_id: r.delivery_street_id,
            subtotal: r.subtotal,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const ORDER_COLUMNS: &str = "id, number, supplier_id, status_id, warehouse_id, location_id, \
     currency_id, delivery_street_id, subtotal, created_by, created_at, updated_at";

#[async_trait]
impl ProcurementStore for PgStore {
    async fn query_supplier_products(
        &self,
        filter: &SupplierProductFilter,
        order: SupplierProductOrder,
        page: Page,
    ) -> Result<(Vec<SupplierProduct>, u64), StoreError> {
        let order_by = match order {
            SupplierProductOrder::UnitCostAsc => "unit_cost ASC, id ASC",
        };

        // NULL-bind pattern: a NULL parameter disables its predicate.
        let rows: Vec<SupplierProductRow> = sqlx::query_as(&format!(
            r#"
            SELECT id, supplier_id, product_id, unit_cost, discount, is_primary_supplier
            FROM procure.supplier_products
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR supplier_id = $2)
              AND ($3::boolean IS NULL OR is_primary_supplier = $3)
            ORDER BY {order_by}
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.product_id)
        .bind(filter.supplier_id)
        .bind(filter.is_primary_supplier)
        .bind(i64::from(page.rows_per_page))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT count(*)
            FROM procure.supplier_products
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR supplier_id = $2)
              AND ($3::boolean IS NULL OR is_primary_supplier = $3)
            "#,
        )
        .bind(filter.product_id)
        .bind(filter.supplier_id)
        .bind(filter.is_primary_supplier)
        .fetch_one(&self.pool)
        .await?;

        Ok((
            rows.into_iter().map(Into::into).collect(),
            total.max(0) as u64,
        ))
    }

    async fn supplier_product_by_id(&self, id: Uuid) -> Result<SupplierProduct, StoreError> {
        let row: Option<SupplierProductRow> = sqlx::query_as(
            r#"
            SELECT id, supplier_id, product_id, unit_cost, discount, is_primary_supplier
            FROM procure.supplier_products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into).ok_or(StoreError::NotFound {
            entity: "supplier_product",
            id,
        })
    }

    async fn purchase_order_by_id(&self, id: Uuid) -> Result<PurchaseOrder, StoreError> {
        let row: Option<PurchaseOrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM procure.purchase_orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into).ok_or(StoreError::NotFound {
            entity: "purchase_order",
            id,
        })
    }

    async fn begin(&self) -> Result<Box<dyn ProcurementTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

/// One open Postgres transaction. Drop without commit = rollback.
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ProcurementTx for PgTx {
    async fn create_order(&mut self, new: &NewPurchaseOrder) -> Result<PurchaseOrder, StoreError> {
        let row: PurchaseOrderRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO procure.purchase_orders (
                id, number, supplier_id, status_id, warehouse_id, location_id,
                currency_id, delivery_street_id, subtotal, created_by
            ) VALUES (
                gen_random_uuid(),
                'PO-' || lpad(nextval('procure.po_number_seq')::text, 6, '0'),
                $1, $2, $3, $4, $5, $6, $7, $8
            )
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(new.supplier_id)
        .bind(new.status_id)
        .bind(new.warehouse_id)
        .bind(new.location_id)
        .bind(new.currency_id)
        .bind(new.delivery_street_id)
        .bind(new.subtotal)
        .bind(new.created_by)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn create_line(
        &mut self,
        new: &NewPurchaseOrderLine,
    ) -> Result<PurchaseOrderLine, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO procure.purchase_order_line_items (
                id, purchase_order_id, supplier_product_id, status_id,
                quantity_ordered, unit_cost, discount, notes
            ) VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7)
            RETURNING id, created_at
            "#,
        )
        .bind(new.purchase_order_id)
        .bind(new.supplier_product_id)
        .bind(new.status_id)
        .bind(new.quantity_ordered)
        .bind(new.unit_cost)
        .bind(new.discount)
        .bind(&new.notes)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(PurchaseOrderLine {
            id: row.get("id"),
            purchase_order_id: new.purchase_order_id,
            supplier_product_id: new.supplier_product_id,
            status_id: new.status_id,
            quantity_ordered: new.quantity_ordered,
            unit_cost: new.unit_cost,
            discount: new.discount,
            notes: new.notes.clone(),
            created_at: row.get("created_at"),
        })
    }

    async fn update_order_status(
        &mut self,
        order_id: Uuid,
        status_id: Uuid,
    ) -> Result<PurchaseOrder, StoreError> {
        let row: Option<PurchaseOrderRow> = sqlx::query_as(&format!(
            r#"
            UPDATE procure.purchase_orders
            SET status_id = $2, updated_at = now()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id)
        .bind(status_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Into::into).ok_or(StoreError::NotFound {
            entity: "purchase_order",
            id: order_id,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
