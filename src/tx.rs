//! Transaction Coordinator
//!
//! One `UnitOfWork` per handler invocation: wraps a single store
//! transaction, stages one delegate event per successful mutation, commits
//! exactly once, and publishes the staged events only after the commit
//! succeeds. Dropping the unit without committing rolls the transaction
//! back and discards the staged events — no partial writes, no events for
//! writes that never happened.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::delegate::{DelegateAction, DelegateBus, DelegateEvent};
use crate::domain::{
    NewPurchaseOrder, NewPurchaseOrderLine, PurchaseOrder, PurchaseOrderLine,
    DOMAIN_PURCHASE_ORDER, DOMAIN_PURCHASE_ORDER_LINE,
};
use crate::error::StoreError;
use crate::store::{ProcurementStore, ProcurementTx};

/// A single-invocation write scope: one transaction plus the delegate
/// events earned by its mutations.
pub struct UnitOfWork {
    tx: Box<dyn ProcurementTx>,
    bus: Arc<DelegateBus>,
    pending_events: Vec<DelegateEvent>,
}

impl UnitOfWork {
    /// Open a transaction against the store.
    pub async fn begin(
        store: &dyn ProcurementStore,
        bus: Arc<DelegateBus>,
    ) -> Result<Self, StoreError> {
        let tx = store.begin().await?;
        Ok(Self {
            tx,
            bus,
            pending_events: Vec::new(),
        })
    }

    pub async fn create_order(
        &mut self,
        new: &NewPurchaseOrder,
    ) -> Result<PurchaseOrder, StoreError> {
        let order = self.tx.create_order(new).await?;
        self.stage(DOMAIN_PURCHASE_ORDER, DelegateAction::Created, &order)?;
        Ok(order)
    }

    pub async fn create_line(
        &mut self,
        new: &NewPurchaseOrderLine,
    ) -> Result<PurchaseOrderLine, StoreError> {
        let line = self.tx.create_line(new).await?;
        self.stage(DOMAIN_PURCHASE_ORDER_LINE, DelegateAction::Created, &line)?;
        Ok(line)
    }

    pub async fn update_order_status(
        &mut self,
        order_id: Uuid,
        status_id: Uuid,
    ) -> Result<PurchaseOrder, StoreError> {
        let order = self.tx.update_order_status(order_id, status_id).await?;
        self.stage(DOMAIN_PURCHASE_ORDER, DelegateAction::Updated, &order)?;
        Ok(order)
    }

    /// Commit the transaction, then publish the staged delegate events.
    /// Publication is best-effort and happens strictly after the commit:
    /// a subscriber failure can no longer affect the writes.
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        debug!(
            events = self.pending_events.len(),
            "Transaction committed; publishing delegate events"
        );
        for event in &self.pending_events {
            self.bus.publish(event).await;
        }
        Ok(())
    }

    /// Roll back and discard staged events.
    pub async fn abort(self) -> Result<(), StoreError> {
        self.tx.rollback().await
    }

    fn stage<T: Serialize>(
        &mut self,
        domain: &str,
        action: DelegateAction,
        entity: &T,
    ) -> Result<(), StoreError> {
        let payload: Value = serde_json::to_value(entity)
            .map_err(|e| StoreError::Backend(format!("event payload serialization: {e}")))?;
        self.pending_events
            .push(DelegateEvent::new(domain, action, payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::{DelegateFilter, DelegateSubscriber};
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl DelegateSubscriber for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn interest(&self) -> DelegateFilter {
            DelegateFilter::all()
        }

        async fn on_event(&self, _event: &DelegateEvent) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn new_order() -> NewPurchaseOrder {
        NewPurchaseOrder {
            supplier_id: Uuid::new_v4(),
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
    async fn events_publish_only_after_commit() {
        let store = MemoryStore::new();
        let counter = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        let mut bus = DelegateBus::new();
        bus.subscribe(counter.clone());
        let bus = Arc::new(bus);

        let mut uow = UnitOfWork::begin(&store, bus.clone()).await.unwrap();
        uow.create_order(&new_order()).await.unwrap();
        assert_eq!(counter.seen.load(Ordering::SeqCst), 0, "nothing before commit");
        uow.commit().await.unwrap();
        assert_eq!(counter.seen.load(Ordering::SeqCst), 1);

        // Aborted unit publishes nothing.
        let mut uow = UnitOfWork::begin(&store, bus).await.unwrap();
        uow.create_order(&new_order()).await.unwrap();
        uow.abort().await.unwrap();
        assert_eq!(counter.seen.load(Ordering::SeqCst), 1);
        assert_eq!(store.order_count(), 1);
    }
}
