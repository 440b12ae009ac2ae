//! # Bus handler contract
//!
//! [`Handler`] is the extension point for reacting to bus events. Every handler runs
//! on the single dispatch loop, so handler code never runs concurrently with other
//! handler code.
//!
//! ## Contract
//! - A handler may complete synchronously or `.await` cooperatively; it must not
//!   block the loop's thread with blocking I/O.
//! - Returning `Err` (or panicking) removes **this subscription only**; the handler's
//!   other subscriptions stay registered.
//!
//! ## Example
//! ```rust
//! use panelvisor::subscribers::{Handler, HandlerFn};
//! use panelvisor::events::Event;
//! use panelvisor::HandlerError;
//!
//! let h = HandlerFn::arc("print", |ev: &Event| {
//!     println!("{}", ev.event_type());
//!     Ok::<_, HandlerError>(())
//! });
//! assert_eq!(h.name(), "print");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::Event;

/// Shared handle to a handler object.
pub type HandlerRef = Arc<dyn Handler>;

/// Contract for bus handlers.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handle a single event delivered to this subscription.
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;

    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Closure-backed synchronous handler.
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F>
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    /// Wraps a closure that runs to completion for every event.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        (self.f)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Closure-backed handler that produces a fresh future per event.
///
/// The closure receives an owned clone of the event so the future can outlive the borrow.
pub struct AsyncHandlerFn<F, Fut> {
    name: Cow<'static, str>,
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncHandlerFn<F, Fut>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            f,
            _fut: PhantomData,
        })
    }
}

#[async_trait]
impl<F, Fut> Handler for AsyncHandlerFn<F, Fut>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        (self.f)(event.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
