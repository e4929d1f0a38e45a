//! Built-in Action Handlers
//!
//! One module per action type. Adding an action type is one new module
//! plus one `register` call here; the dispatcher never changes.

use std::sync::Arc;

use crate::delegate::DelegateBus;
use crate::error::ActionError;
use crate::registry::HandlerRegistry;
use crate::store::ProcurementStore;

pub mod create_purchase_order;
pub mod update_order_status;

pub use create_purchase_order::CreatePurchaseOrderHandler;
pub use update_order_status::UpdateOrderStatusHandler;

/// Registry with every built-in handler wired to the given collaborators.
pub fn builtin_registry(
    store: Arc<dyn ProcurementStore>,
    bus: Arc<DelegateBus>,
) -> Result<HandlerRegistry, ActionError> {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(CreatePurchaseOrderHandler::new(
        store.clone(),
        bus.clone(),
    )))?;
    registry.register(Arc::new(UpdateOrderStatusHandler::new(store, bus)))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[test]
    fn builtin_registry_holds_all_handlers() {
        let registry = builtin_registry(
            Arc::new(MemoryStore::new()),
            Arc::new(DelegateBus::new()),
        )
        .unwrap();

        assert_eq!(
            registry.action_types(),
            vec![
                create_purchase_order::ACTION_TYPE,
                update_order_status::ACTION_TYPE,
            ]
        );
    }
}
