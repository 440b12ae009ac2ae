//! Panel events: data model and bus.
//!
//! ## Contents
//! - [`Event`], [`Payload`], [`kinds`] event type strings and payload
//! - [`filter_matches`] AND-semantics payload filter used by subscriptions
//! - [`EventBus`] bounded lossy queue plus the single dispatch loop
//!
//! ## Quick reference
//! - **Publishers**: `HardwareEventBridge` (input/LED events), `AppLauncher` and
//!   `AppRunner` (`system.app.*`), mini-apps through their scoped bus, `SystemManager`.
//! - **Consumers**: handlers registered with [`EventBus::subscribe`], all invoked
//!   serially on the dispatch loop.
//!
//! See `core/mod.rs` for the system-level wiring diagram.

mod bus;
mod event;

pub use bus::EventBus;
pub use event::{Event, Payload, filter_matches, kinds};
