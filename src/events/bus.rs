//! # Event bus with a single dispatch loop.
//!
//! [`EventBus`] wraps a bounded [`tokio::sync::broadcast`] channel used as a lossy
//! queue, plus a subscription table. Any thread may publish; exactly one dispatch
//! loop drains the queue and invokes handlers one at a time.
//!
//! ## Architecture
//! ```text
//! Publishers (many threads):           Dispatch loop (one task):
//!   poller thread ──┐
//!   app worker    ──┼──► queue ──────► recv ──► SubscriptionTable::matching
//!   handlers      ──┤  (broadcast,               │
//!   console       ──┘   bounded)                 └─► handler.handle(ev) (one at a time)
//!                                                      └─ Err / panic ─► unsubscribe(id)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish*()` never blocks; it calls `broadcast::Sender::send`.
//! - **Lossy overflow**: when the queue is full the oldest pending event is dropped;
//!   the loop observes `RecvError::Lagged(n)` and logs a warning.
//! - **Serial handlers**: handler code never runs concurrently with other handler code.
//! - **Failure isolation**: a failing or panicking handler loses only that subscription.
//! - **Early events kept**: events published before [`EventBus::start`] are queued
//!   (up to capacity) and dispatched once the loop runs.
//! - **Drain on stop**: cancelling the loop dispatches already queued events, then exits.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::event::{Event, Payload};
use crate::error::{HandlerError, RuntimeError, panic_message};
use crate::subscribers::{HandlerRef, SubscriptionId, SubscriptionTable, Topic};

struct Inner {
    tx: broadcast::Sender<Event>,
    /// Receiver created with the channel; taken by the dispatch loop on start.
    rx: Mutex<Option<broadcast::Receiver<Event>>>,
    table: Mutex<SubscriptionTable>,
    capacity: usize,
}

impl Inner {
    fn table(&self) -> MutexGuard<'_, SubscriptionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publish/subscribe broker; the sole channel between runtime components.
///
/// Cheap to clone (internally `Arc`).
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.inner.capacity)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl EventBus {
    /// Creates a bus whose queue holds at least `capacity` pending events (min 1).
    ///
    /// The broadcast channel rounds the bound up to a power of two, so a requested
    /// 1000 holds 1024; [`capacity`](Self::capacity) reports the real bound.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let (tx, rx) = broadcast::channel::<Event>(capacity);
        Self {
            inner: Arc::new(Inner {
                tx,
                rx: Mutex::new(Some(rx)),
                table: Mutex::new(SubscriptionTable::default()),
                capacity,
            }),
        }
    }

    /// Pending events held before the oldest is dropped.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Publishes an event from handler code running on the dispatch loop.
    ///
    /// The event is queued, never dispatched re-entrantly, so the current handler
    /// finishes before anyone observes it.
    pub fn publish(&self, event_type: &str, payload: Value) {
        self.publish_event(Event::from_value(event_type, payload));
    }

    /// Publishes an event from any thread without blocking the caller.
    pub fn publish_threadsafe(&self, event_type: &str, payload: Value) {
        self.publish_event(Event::from_value(event_type, payload));
    }

    /// Publishes a prepared event.
    pub fn publish_event(&self, ev: Event) {
        // Err only when the dispatch loop is gone (after shutdown).
        if self.inner.tx.send(ev).is_err() {
            debug!("event published after dispatch loop exit; dropped");
        }
    }

    /// Registers `handler` for events matching `pattern` and the optional `filter`.
    ///
    /// `pattern` is an exact dotted type, `"prefix.*"` or `"*"`.
    /// A filter matches when every key equals the payload's value for that key.
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: HandlerRef,
        filter: Option<Payload>,
    ) -> SubscriptionId {
        let id = self
            .inner
            .table()
            .insert(Topic::parse(pattern), filter, handler);
        debug!(subscription = %id, pattern, "subscribed");
        id
    }

    /// Removes a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.table().remove(id)
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.table().len()
    }

    /// Spawns the dispatch loop on the current tokio runtime.
    ///
    /// The loop runs until `token` is cancelled, then drains queued events and exits.
    /// Starting a second loop fails with [`RuntimeError::AlreadyStarted`].
    pub fn start(&self, token: CancellationToken) -> Result<JoinHandle<()>, RuntimeError> {
        let rx = self
            .inner
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RuntimeError::AlreadyStarted)?;
        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(dispatch_loop(inner, rx, token)))
    }
}

async fn dispatch_loop(
    inner: Arc<Inner>,
    mut rx: broadcast::Receiver<Event>,
    token: CancellationToken,
) {
    info!(capacity = inner.capacity, "dispatch loop started");
    loop {
        tokio::select! {
            biased;
            res = rx.recv() => match res {
                Ok(ev) => dispatch(&inner, &ev).await,
                Err(RecvError::Lagged(dropped)) => {
                    warn!(dropped, "event queue overflow; oldest events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = token.cancelled() => break,
        }
    }

    loop {
        match rx.try_recv() {
            Ok(ev) => dispatch(&inner, &ev).await,
            Err(TryRecvError::Lagged(dropped)) => {
                warn!(dropped, "event queue overflow during drain; oldest events dropped");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    info!("dispatch loop stopped");
}

/// Delivers one event to every matching subscription, in registration order.
async fn dispatch(inner: &Inner, ev: &Event) {
    let targets = inner.table().matching(ev);
    for (id, handler) in targets {
        // An earlier handler may have unsubscribed this one.
        if !inner.table().contains(id) {
            continue;
        }
        let err = match AssertUnwindSafe(handler.handle(ev)).catch_unwind().await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(payload) => HandlerError::Panicked {
                info: panic_message(payload.as_ref()),
            },
        };
        inner.table().remove(id);
        error!(
            subscription = %id,
            handler = handler.name(),
            event_type = ev.event_type(),
            label = err.as_label(),
            error = %err,
            "handler failed; subscription removed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::kinds;
    use crate::subscribers::HandlerFn;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counter(hits: &Arc<AtomicUsize>) -> HandlerRef {
        let hits = Arc::clone(hits);
        HandlerFn::arc("counter", move |_ev: &Event| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok::<_, HandlerError>(())
        })
    }

    async fn settle(token: CancellationToken, handle: JoinHandle<()>) {
        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    #[test]
    fn capacity_reports_the_rounded_bound() {
        assert_eq!(EventBus::new(1000).capacity(), 1024);
        assert_eq!(EventBus::new(64).capacity(), 64);
        assert_eq!(EventBus::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let bus = EventBus::new(8);
        let token = CancellationToken::new();
        let handle = bus.start(token.clone()).expect("first start");
        assert!(matches!(
            bus.start(token.clone()),
            Err(RuntimeError::AlreadyStarted)
        ));
        settle(token, handle).await;
    }

    #[tokio::test]
    async fn events_published_before_start_are_dispatched() {
        let bus = EventBus::new(16);
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe(kinds::GO_BUTTON_PRESSED, counter(&hits), None);
        bus.publish(kinds::GO_BUTTON_PRESSED, Value::Null);
        bus.publish(kinds::GO_BUTTON_PRESSED, Value::Null);

        let token = CancellationToken::new();
        let handle = bus.start(token.clone()).expect("start");
        settle(token, handle).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let bus = EventBus::new(4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            "n",
            HandlerFn::arc("record", move |ev: &Event| {
                sink.lock().unwrap().push(ev.get_u64("value").unwrap_or(0));
                Ok::<_, HandlerError>(())
            }),
            None,
        );
        for i in 0..10u64 {
            bus.publish_threadsafe("n", json!(i));
        }
        let token = CancellationToken::new();
        let handle = bus.start(token.clone()).expect("start");
        settle(token, handle).await;
        assert_eq!(*seen.lock().unwrap(), vec![6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn failing_handler_loses_only_that_subscription() {
        let bus = EventBus::new(16);
        let hits = Arc::new(AtomicUsize::new(0));
        let failing = HandlerFn::arc("failing", |_ev: &Event| Err(HandlerError::fail("boom")));
        bus.subscribe("a", failing.clone(), None);
        bus.subscribe("b", failing, None);
        bus.subscribe("a", counter(&hits), None);

        bus.publish("a", Value::Null);
        bus.publish("a", Value::Null);
        let token = CancellationToken::new();
        let handle = bus.start(token.clone()).expect("start");
        settle(token, handle).await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        // "a" subscription of the failing handler removed, its "b" one kept.
        assert_eq!(bus.subscription_count(), 2);
    }

    #[tokio::test]
    async fn panicking_handler_is_removed_and_loop_survives() {
        let bus = EventBus::new(16);
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "a",
            HandlerFn::arc("panics", |_ev: &Event| -> Result<(), HandlerError> {
                panic!("handler exploded")
            }),
            None,
        );
        bus.subscribe("a", counter(&hits), None);
        bus.publish("a", Value::Null);
        bus.publish("a", Value::Null);

        let token = CancellationToken::new();
        let handle = bus.start(token.clone()).expect("start");
        settle(token, handle).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(bus.subscription_count(), 1);
    }

    #[tokio::test]
    async fn handler_may_unsubscribe_a_later_one() {
        let bus = EventBus::new(16);
        let hits = Arc::new(AtomicUsize::new(0));
        let victim = Arc::new(Mutex::new(None::<SubscriptionId>));

        let bus2 = bus.clone();
        let v2 = Arc::clone(&victim);
        bus.subscribe(
            "a",
            HandlerFn::arc("killer", move |_ev: &Event| {
                if let Some(id) = *v2.lock().unwrap() {
                    bus2.unsubscribe(id);
                }
                Ok::<_, HandlerError>(())
            }),
            None,
        );
        let id = bus.subscribe("a", counter(&hits), None);
        *victim.lock().unwrap() = Some(id);

        bus.publish("a", Value::Null);
        let token = CancellationToken::new();
        let handle = bus.start(token.clone()).expect("start");
        settle(token, handle).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
