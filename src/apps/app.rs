//! # Mini-app contract.
//!
//! A [`MiniApp`] is the sole extension point of the panel. It runs on a dedicated
//! worker thread with `(stop_signal, scoped_api)` and must return promptly once the
//! stop signal is set. The common handle type is [`AppRef`].

use std::sync::Arc;

use super::api::AppApi;
use super::stop::StopSignal;
use crate::error::AppError;

/// # Pluggable unit of panel behaviour.
///
/// Invoked on its own OS thread. Blocking calls are fine, but long waits should go
/// through [`StopSignal::wait`] so the app notices cancellation.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use panelvisor::apps::{AppApi, MiniApp, StopSignal};
/// use panelvisor::AppError;
///
/// struct Clock;
///
/// impl MiniApp for Clock {
///     fn run(&self, stop: &StopSignal, api: &AppApi) -> Result<(), AppError> {
///         let mut ticks = 0u32;
///         while !stop.wait(Duration::from_secs(1)) {
///             ticks += 1;
///             api.display_text(format!("{ticks}s"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait MiniApp: Send + Sync + 'static {
    /// Runs the app until it finishes or observes `stop`.
    fn run(&self, stop: &StopSignal, api: &AppApi) -> Result<(), AppError>;
}

/// Shared handle to a mini-app.
pub type AppRef = Arc<dyn MiniApp>;
