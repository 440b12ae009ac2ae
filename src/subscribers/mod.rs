//! # Bus handlers and subscriptions.
//!
//! - [`Handler`] trait: the extension point for reacting to bus events.
//! - [`HandlerFn`] / [`AsyncHandlerFn`]: closure-backed handlers.
//! - [`SubscriptionId`] / [`Topic`]: what a subscription is and listens to.
//! - [`EventLogger`]: built-in debug tracer for every event.
//!
//! The subscription table itself is internal to the bus.

mod handler;
mod log;
mod table;

pub use handler::{AsyncHandlerFn, Handler, HandlerFn, HandlerRef};
pub use log::EventLogger;
pub(crate) use table::SubscriptionTable;
pub use table::{SubscriptionId, Topic};
