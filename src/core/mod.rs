//! Runtime core: discovery, execution and lifecycle.
//!
//! - [`bridge`]: raw backend input → bus events, LED gating, sole LED writer;
//! - [`manager`]: manifest scan, validation and the switch → app mapping;
//! - [`runner`]: the single execution slot and its state machine;
//! - [`launcher`]: go-button handling and pre-emption;
//! - [`renderer`]: applies screen updates on the dispatch loop;
//! - [`system`] / [`builder`]: wiring, startup and graceful shutdown;
//! - [`shutdown`]: OS termination signals.

mod bridge;
mod builder;
mod launcher;
mod manager;
mod renderer;
mod runner;
mod shutdown;
mod system;

pub use bridge::HardwareEventBridge;
pub use builder::SystemBuilder;
pub use launcher::AppLauncher;
pub use manager::{AppManager, AppSummary};
pub use renderer::ScreenRenderer;
pub use runner::{AppRunner, FinishReason, RunnerSettings, RunnerStatus};
pub use shutdown::wait_for_shutdown_signal;
pub use system::SystemManager;
