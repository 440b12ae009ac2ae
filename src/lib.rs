//! # panelvisor
//!
//! **Panelvisor** is the runtime of a physical control panel: an 8-bit switch
//! bank selects a mini-app, a go button launches it, and four coloured
//! button/LED pairs plus a numeric display and a screen are its I/O.
//!
//! Mini-apps are compiled-in plugins described by `manifest.json` files; the
//! runtime discovers them, maps switch values to them, runs at most one at a
//! time and tears it down cooperatively on timeout or pre-emption.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌──────────────────────────────┐
//!  │ Hardware (SimHardware |      │  switches · go · colour buttons
//!  │           GpioHardware)      │  LEDs · display · screen · speaker
//!  └──────────────┬───────────────┘
//!                 │ RawInput (backend threads)
//!                 ▼
//!  ┌──────────────────────────────┐
//!  │ HardwareEventBridge          │  LED gating, sole LED writer
//!  └──────────────┬───────────────┘
//!                 │ publish_threadsafe
//!                 ▼
//!  ┌───────────────────────────────────────────────────────────────┐
//!  │ EventBus (bounded queue, drop-oldest, single dispatch loop)   │
//!  └──────┬─────────────────────┬────────────────────────┬─────────┘
//!         ▼                     ▼                        ▼
//!  ┌──────────────┐     ┌────────────────┐     ┌──────────────────┐
//!  │ AppLauncher  │     │ ScreenRenderer │     │ app subscriptions│
//!  └──────┬───────┘     └────────────────┘     └──────────────────┘
//!         │ resolve(switch)            ▲
//!         ▼                            │ AppApi (scoped)
//!  ┌──────────────┐   launch    ┌──────┴───────┐
//!  │ AppManager   │ ──────────► │ AppRunner    │ ──► mini-app thread
//!  └──────────────┘             └──────────────┘
//! ```
//!
//! ### Execution lifecycle
//! ```text
//! go pressed ──► launch.requested{switch_value}
//!   ├─ unmapped ─► "No app mapped to switch N"
//!   └─ mapped:
//!        runner.stop()                       (pre-empt current app)
//!        runner.launch() ─► Running ─► system.app.started{app_name, switch_value}
//!          ├─ returns            ─► Finished ─► system.app.finished{reason: normal|stopped}
//!          ├─ fails / panics     ─► Error    ─► system.app.error{error}
//!          └─ deadline expires   ─► TimedOut ─► system.app.finished{reason: timeout}
//!        cleanup: app subscriptions removed, LEDs off, back to Idle
//! ```
//!
//! ## Features
//! | Area            | Description                                              | Key types                                  |
//! |-----------------|----------------------------------------------------------|--------------------------------------------|
//! | **Events**      | Typed topics, payload filters, wildcard subscriptions.   | [`EventBus`], [`Event`], [`Handler`]       |
//! | **Hardware**    | One trait, simulation and multiplexed-GPIO backends.     | [`Hardware`], [`SimHardware`]              |
//! | **Apps**        | Manifests, registry, scoped API, cooperative stop.       | [`MiniApp`], [`AppApi`], [`StopSignal`]    |
//! | **Runtime**     | Discovery, single-slot runner, launcher, shutdown.       | [`SystemManager`], [`AppRunner`]           |
//! | **Config**      | JSON config, env overrides, secrets, per-app overrides.  | [`PanelConfig`], [`PanelContext`]          |
//! | **Errors**      | Typed errors with stable log labels.                     | [`RuntimeError`], [`AppError`]             |
//!
//! ## Optional features
//! - `gpio`: Linux sysfs pin bank for the real panel.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use panelvisor::{PanelContext, SimHardware, SystemBuilder};
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> Result<(), panelvisor::RuntimeError> {
//!     let sim = Arc::new(SimHardware::with_switch(1));
//!     let system = SystemBuilder::new(PanelContext::default())
//!         .with_hardware(sim.clone())
//!         .build();
//!
//!     system.start()?;
//!     sim.simulate_go();
//!     system.shutdown("example").await
//! }
//! ```

pub mod apps;
pub mod config;
pub mod core;
mod error;
pub mod events;
pub mod hal;
pub mod policies;
pub mod subscribers;

// ---- Public re-exports ----

pub use apps::{AppApi, AppFn, AppManifest, AppRef, AppRegistry, MiniApp, StopSignal};
pub use config::{PanelConfig, PanelContext};
pub use core::{
    AppManager, AppRunner, HardwareEventBridge, RunnerStatus, SystemBuilder, SystemManager,
};
pub use error::{
    AppError, ConfigError, HalError, HandlerError, LaunchError, ManifestError, MappingError,
    RuntimeError,
};
pub use events::{Event, EventBus};
pub use hal::{Color, Hardware, SimHardware};
pub use policies::TimeoutBehavior;
pub use subscribers::{Handler, HandlerFn};
