//! Procflow — workflow action execution runtime.
//!
//! A named, configurable "action" (e.g. `create_purchase_order`) is
//! validated, executed transactionally against the procurement domain,
//! terminates on exactly one declared output port, and publishes delegate
//! events for every committed mutation. The surrounding HTTP and event-bus
//! layers invoke this crate in-process through [`Dispatcher::dispatch`];
//! nothing here owns a wire protocol.
//!
//! Flow: trigger → [`ExecutionContext`] → [`Dispatcher`] looks up the
//! [`ActionHandler`] → handler validates its JSON config → one
//! [`tx::UnitOfWork`] transaction → commit → [`DelegateBus`] fan-out →
//! [`resolver::PortRouter`] decides the next step, if any.

pub mod context;
pub mod delegate;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod ports;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod tx;

pub use context::ExecutionContext;
pub use delegate::{DelegateAction, DelegateBus, DelegateEvent, DelegateFilter, DelegateSubscriber};
pub use dispatcher::{ActionDescriptor, DispatchOutcome, Dispatcher};
pub use error::{ActionError, StoreError};
pub use handler::{ActionHandler, ActionResult};
pub use ports::{EntityModification, ModificationEvent, OutputPort};
pub use registry::HandlerRegistry;
pub use resolver::{ChainOutcome, ChainRunner, PortRouter, Route, TriggerMatcher, TriggerRule};
