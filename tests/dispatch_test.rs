//! End-to-end dispatch scenarios over the in-memory store: atomicity,
//! validation-before-side-effects, event propagation, and port routing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use procflow::handlers::{self, create_purchase_order, update_order_status};
use procflow::store::memory::MemoryStore;
use procflow::store::ProcurementStore;
use procflow::{
    ActionError, ChainRunner, DelegateAction, DelegateBus, DelegateEvent, DelegateFilter,
    DelegateSubscriber, Dispatcher, ExecutionContext, PortRouter, Route, TriggerMatcher,
    TriggerRule,
};

struct RecordingSubscriber {
    events: Mutex<Vec<(String, DelegateAction)>>,
}

#[async_trait]
impl DelegateSubscriber for RecordingSubscriber {
    fn name(&self) -> &str {
        "recorder"
    }

    fn interest(&self) -> DelegateFilter {
        DelegateFilter::all()
    }

    async fn on_event(&self, event: &DelegateEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .expect("lock")
            .push((event.domain.clone(), event.action));
        Ok(())
    }
}

struct Fixture {
    store: MemoryStore,
    dispatcher: Dispatcher,
    recorder: Arc<RecordingSubscriber>,
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let recorder = Arc::new(RecordingSubscriber {
        events: Mutex::new(Vec::new()),
    });
    let mut bus = DelegateBus::new();
    bus.subscribe(recorder.clone());
    let registry = handlers::builtin_registry(
        Arc::new(store.clone()) as Arc<dyn ProcurementStore>,
        Arc::new(bus),
    )
    .expect("registry");
    Fixture {
        store,
        dispatcher: Dispatcher::new(registry),
        recorder,
    }
}

fn seed_catalog(store: &MemoryStore, product: Uuid, supplier: Uuid, cost: &str, primary: bool) {
    store.insert_supplier_product(procflow::domain::SupplierProduct {
        id: Uuid::new_v4(),
        supplier_id: supplier,
        product_id: product,
        unit_cost: cost.parse().unwrap(),
        discount: Decimal::ZERO,
        is_primary_supplier: primary,
    });
}

fn po_config(lines: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "status_id": Uuid::new_v4().to_string(),
        "line_item_status_id": Uuid::new_v4().to_string(),
        "warehouse_id": Uuid::new_v4().to_string(),
        "location_id": Uuid::new_v4().to_string(),
        "currency_id": Uuid::new_v4().to_string(),
        "line_items": lines,
    }))
    .unwrap()
}

#[tokio::test]
async fn happy_path_commits_and_publishes_events() {
    let f = fixture();
    let product = Uuid::new_v4();
    seed_catalog(&f.store, product, Uuid::new_v4(), "25.00", true);

    let outcome = f
        .dispatcher
        .dispatch(
            create_purchase_order::ACTION_TYPE,
            &po_config(json!([{"product_id": product.to_string(), "quantity_ordered": 100}])),
            &ExecutionContext::manual(Uuid::new_v4()),
        )
        .await
        .unwrap();

    assert_eq!(outcome.port.name, "created");
    assert!(outcome.port.is_default);
    assert_eq!(outcome.data["subtotal"], json!("2500.00"));
    assert_eq!(f.store.order_count(), 1);
    assert_eq!(f.store.line_count(), 1);

    // One created event per committed entity, header first.
    let events = f.recorder.events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            ("purchase_order".to_string(), DelegateAction::Created),
            ("purchase_order_line_item".to_string(), DelegateAction::Created),
        ]
    );
}

#[tokio::test]
async fn no_supplier_found_creates_nothing_and_publishes_nothing() {
    let f = fixture();
    let product = Uuid::new_v4();

    let outcome = f
        .dispatcher
        .dispatch(
            create_purchase_order::ACTION_TYPE,
            &po_config(json!([{"product_id": product.to_string(), "quantity_ordered": 5}])),
            &ExecutionContext::manual(Uuid::new_v4()),
        )
        .await
        .unwrap();

    assert_eq!(outcome.port.name, "no_supplier_found");
    assert_eq!(f.store.order_count(), 0);
    assert_eq!(f.store.line_count(), 0);
    assert!(f.recorder.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn atomicity_failed_child_create_leaves_no_rows() {
    let f = fixture();
    let product = Uuid::new_v4();
    seed_catalog(&f.store, product, Uuid::new_v4(), "1.00", true);
    f.store.fail_on_line_create(2);

    let err = f
        .dispatcher
        .dispatch(
            create_purchase_order::ACTION_TYPE,
            &po_config(json!([
                {"product_id": product.to_string(), "quantity_ordered": 1},
                {"product_id": product.to_string(), "quantity_ordered": 2},
            ])),
            &ExecutionContext::manual(Uuid::new_v4()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::Store(_)));
    assert_eq!(f.store.order_count(), 0);
    assert_eq!(f.store.line_count(), 0);
    assert!(f.recorder.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_config_never_reaches_the_store() {
    let f = fixture();
    // The store fails the test if anything opens a transaction.
    f.store.forbid_writes();

    // Empty line_items without event sourcing fails validation.
    let err = f
        .dispatcher
        .dispatch(
            create_purchase_order::ACTION_TYPE,
            &po_config(json!([])),
            &ExecutionContext::manual(Uuid::new_v4()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::Config { .. }));
}

#[tokio::test]
async fn entity_modifications_are_static_metadata() {
    let f = fixture();
    f.store.forbid_writes();

    let mods = f
        .dispatcher
        .entity_modifications(create_purchase_order::ACTION_TYPE, &po_config(json!([])))
        .unwrap();

    let entities: Vec<&str> = mods.iter().map(|m| m.entity.as_str()).collect();
    assert_eq!(entities, vec!["purchase_order", "purchase_order_line_item"]);
    assert!(mods
        .iter()
        .all(|m| m.event == procflow::ModificationEvent::OnCreate));
}

#[tokio::test]
async fn unknown_action_type_is_rejected() {
    let f = fixture();
    let err = f
        .dispatcher
        .dispatch(
            "definitely_not_registered",
            b"{}",
            &ExecutionContext::manual(Uuid::new_v4()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::UnknownAction(_)));
}

#[tokio::test]
async fn chain_follows_created_port_into_status_update() {
    let f = fixture();
    let product = Uuid::new_v4();
    seed_catalog(&f.store, product, Uuid::new_v4(), "10.00", true);
    let approved_status = Uuid::new_v4();

    // created → update_purchase_order_status, order id flowing through the
    // result payload into the next step's trigger data.
    let mut router = PortRouter::new();
    router.add_route(
        create_purchase_order::ACTION_TYPE,
        "created",
        Route {
            next_action: update_order_status::ACTION_TYPE.to_string(),
            config: json!({
                "status_id": approved_status.to_string(),
                "source_from_event": true,
            }),
        },
    );

    let runner = ChainRunner::new(&f.dispatcher, &router);
    let outcome = runner
        .run(
            create_purchase_order::ACTION_TYPE,
            &po_config(json!([{"product_id": product.to_string(), "quantity_ordered": 3}])),
            ExecutionContext::manual(Uuid::new_v4()),
        )
        .await
        .unwrap();

    assert_eq!(outcome.steps.len(), 2);
    assert_eq!(outcome.steps[0].port, "created");
    assert_eq!(outcome.steps[1].action_type, update_order_status::ACTION_TYPE);
    assert_eq!(outcome.last.port.name, "updated");

    let order_id: Uuid = outcome.last.data["purchase_order_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    let order = f.store.purchase_order_by_id(order_id).await.unwrap();
    assert_eq!(order.status_id, approved_status);
}

#[tokio::test]
async fn chain_depth_cap_stops_routing_cycles() {
    let f = fixture();
    let order_id = {
        let product = Uuid::new_v4();
        seed_catalog(&f.store, product, Uuid::new_v4(), "1.00", true);
        let outcome = f
            .dispatcher
            .dispatch(
                create_purchase_order::ACTION_TYPE,
                &po_config(json!([{"product_id": product.to_string(), "quantity_ordered": 1}])),
                &ExecutionContext::manual(Uuid::new_v4()),
            )
            .await
            .unwrap();
        outcome.data["purchase_order_id"]
            .as_str()
            .unwrap()
            .to_string()
    };

    // updated → updated, forever.
    let mut router = PortRouter::new();
    router.add_route(
        update_order_status::ACTION_TYPE,
        "updated",
        Route {
            next_action: update_order_status::ACTION_TYPE.to_string(),
            config: json!({
                "status_id": Uuid::new_v4().to_string(),
                "purchase_order_id": order_id,
            }),
        },
    );

    let runner = ChainRunner::new(&f.dispatcher, &router).with_max_depth(4);
    let err = runner
        .run(
            update_order_status::ACTION_TYPE,
            &serde_json::to_vec(&json!({
                "status_id": Uuid::new_v4().to_string(),
                "purchase_order_id": order_id,
            }))
            .unwrap(),
            ExecutionContext::manual(Uuid::new_v4()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::ChainTooDeep { max: 4, .. }));
}

#[tokio::test]
async fn delegate_event_triggers_follow_up_invocation() {
    // A product "update" event (reorder-threshold breach) launches a
    // purchase-order creation whose parameters come from the event payload.
    let f = fixture();
    let product = Uuid::new_v4();
    seed_catalog(&f.store, product, Uuid::new_v4(), "4.00", true);

    let matcher = TriggerMatcher::new(vec![TriggerRule {
        domain: "product".to_string(),
        action: DelegateAction::Updated,
        next_action: create_purchase_order::ACTION_TYPE.to_string(),
        config: json!({
            "status_id": Uuid::new_v4().to_string(),
            "line_item_status_id": Uuid::new_v4().to_string(),
            "warehouse_id": Uuid::new_v4().to_string(),
            "location_id": Uuid::new_v4().to_string(),
            "currency_id": Uuid::new_v4().to_string(),
            "source_from_event": true,
        }),
    }]);

    let event = DelegateEvent::new(
        "product",
        DelegateAction::Updated,
        json!({"product_id": product.to_string(), "quantity": 50}),
    );

    let pending = matcher.invocations_for(&event, Uuid::new_v4());
    assert_eq!(pending.len(), 1);

    let invocation = &pending[0];
    let outcome = f
        .dispatcher
        .dispatch(
            &invocation.action_type,
            &serde_json::to_vec(&invocation.config).unwrap(),
            &invocation.exec,
        )
        .await
        .unwrap();

    assert_eq!(outcome.port.name, "created");
    assert_eq!(outcome.data["subtotal"], json!("200.00"));
    assert_eq!(f.store.order_count(), 1);
}

#[tokio::test]
async fn concurrent_invocations_are_independent() {
    let f = Arc::new(fixture());
    let mut handles = Vec::new();
    let launched = Arc::new(AtomicUsize::new(0));

    for _ in 0..8 {
        let product = Uuid::new_v4();
        seed_catalog(&f.store, product, Uuid::new_v4(), "2.00", true);
        let f = f.clone();
        let launched = launched.clone();
        handles.push(tokio::spawn(async move {
            launched.fetch_add(1, Ordering::SeqCst);
            f.dispatcher
                .dispatch(
                    create_purchase_order::ACTION_TYPE,
                    &po_config(json!([{"product_id": product.to_string(), "quantity_ordered": 1}])),
                    &ExecutionContext::manual(Uuid::new_v4()),
                )
                .await
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.port.name, "created");
    }
    assert_eq!(launched.load(Ordering::SeqCst), 8);
    assert_eq!(f.store.order_count(), 8);
}
