//! # Mini-apps: contract, manifests and the scoped API.
//!
//! - [`MiniApp`] / [`AppRef`]: the extension point, run with `(stop_signal, scoped_api)`.
//! - [`AppFn`]: closure-backed mini-app.
//! - [`AppRegistry`]: compiled-in apps by `entry_point` name.
//! - [`AppManifest`]: validated `manifest.json`.
//! - [`StopSignal`]: cooperative cancellation ("wait until stopped or timeout").
//! - [`AppApi`]: capability-scoped facade for one execution.
//! - [`HelloWorld`]: built-in demo app.

mod api;
mod app;
mod app_fn;
mod hello_world;
mod manifest;
mod registry;
mod stop;

pub use api::{ApiParts, AppApi};
pub use app::{AppRef, MiniApp};
pub use app_fn::AppFn;
pub use hello_world::HelloWorld;
pub use manifest::{AppManifest, MANIFEST_FILE};
pub use registry::AppRegistry;
pub use stop::StopSignal;
