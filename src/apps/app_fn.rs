//! # Function-backed mini-app (`AppFn`)
//!
//! [`AppFn`] wraps a closure `F: Fn(&StopSignal, &AppApi) -> Result<(), AppError>`.
//! Each launch calls the closure afresh; state shared across launches must be held
//! explicitly in an `Arc<...>` captured by the closure.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use panelvisor::apps::{AppFn, AppRef, StopSignal, AppApi};
//! use panelvisor::AppError;
//!
//! let app: AppRef = AppFn::arc(|stop: &StopSignal, api: &AppApi| {
//!     api.display_text("waiting");
//!     stop.wait(Duration::from_secs(30));
//!     Ok::<_, AppError>(())
//! });
//! # let _ = app;
//! ```

use std::sync::Arc;

use super::api::AppApi;
use super::app::MiniApp;
use super::stop::StopSignal;
use crate::error::AppError;

/// Closure-backed mini-app.
pub struct AppFn<F> {
    f: F,
}

impl<F> AppFn<F>
where
    F: Fn(&StopSignal, &AppApi) -> Result<(), AppError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the app and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F> MiniApp for AppFn<F>
where
    F: Fn(&StopSignal, &AppApi) -> Result<(), AppError> + Send + Sync + 'static, // Fn, not FnMut
{
    fn run(&self, stop: &StopSignal, api: &AppApi) -> Result<(), AppError> {
        (self.f)(stop, api)
    }
}
