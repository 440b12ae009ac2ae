mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::Recorder;
use panelvisor::events::Payload;
use panelvisor::{Event, EventBus, HandlerError, HandlerFn};
use serde_json::json;
use tokio_util::sync::CancellationToken;

async fn drain(bus: &EventBus) {
    let token = CancellationToken::new();
    let handle = bus.start(token.clone()).unwrap();
    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

fn filter(v: serde_json::Value) -> Option<Payload> {
    v.as_object().cloned()
}

#[tokio::test]
async fn filtered_subscription_sees_only_matching_payloads() {
    let bus = EventBus::new(64);
    let red = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&red);
    bus.subscribe(
        "input.button.pressed",
        HandlerFn::arc("red-only", move |_e: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, HandlerError>(())
        }),
        filter(json!({"button": "red"})),
    );

    bus.publish("input.button.pressed", json!({"button": "red"}));
    bus.publish("input.button.pressed", json!({"button": "blue"}));
    bus.publish("input.button.pressed", json!({}));
    bus.publish("input.button.pressed", json!({"button": "red", "extra": 1}));
    drain(&bus).await;

    assert_eq!(red.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn wildcard_and_prefix_topics() {
    let bus = EventBus::new(64);
    let all = Recorder::attach(&bus, "*");
    let system = Recorder::attach(&bus, "system.*");
    let exact = Recorder::attach(&bus, "system.app.started");

    bus.publish("input.switch.changed", json!({"old_value": 0, "new_value": 1}));
    bus.publish("system.app.started", json!({"app_name": "a", "switch_value": 1}));
    bus.publish("system.started", json!({"hardware_type": "simulation"}));
    bus.publish("systemic.noise", json!(null));
    drain(&bus).await;

    assert_eq!(all.events().len(), 4);
    assert_eq!(system.types(), vec!["system.app.started", "system.started"]);
    assert_eq!(exact.types(), vec!["system.app.started"]);
}

#[tokio::test]
async fn failing_handler_is_removed_and_others_keep_receiving() {
    let bus = EventBus::new(64);
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let failing = HandlerFn::arc("flaky", move |_e: &Event| {
        c.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::fail("boom"))
    });
    let failing_id = bus.subscribe("tick", failing.clone(), None);
    let other_id = bus.subscribe("tock", failing, None);
    let healthy = Recorder::attach(&bus, "tick");

    for i in 0..3 {
        bus.publish("tick", json!({"n": i}));
    }
    drain(&bus).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.events().len(), 3);
    assert!(!bus.unsubscribe(failing_id));
    // Same handler, different subscription: untouched.
    assert!(bus.unsubscribe(other_id));
}

#[tokio::test]
async fn single_thread_publish_order_is_preserved() {
    let bus = EventBus::new(256);
    let rec = Recorder::attach(&bus, "seq");

    let publisher = {
        let bus = bus.clone();
        std::thread::spawn(move || {
            for i in 0..100u64 {
                bus.publish_threadsafe("seq", json!({"i": i}));
            }
        })
    };
    publisher.join().unwrap();
    drain(&bus).await;

    let seen: Vec<u64> = rec
        .events()
        .iter()
        .filter_map(|e| e.get_u64("i"))
        .collect();
    assert_eq!(seen, (0..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn non_object_payloads_are_wrapped() {
    let bus = EventBus::new(8);
    let rec = Recorder::attach(&bus, "*");
    bus.publish("a", json!(5));
    bus.publish("b", json!(null));
    drain(&bus).await;

    let events = rec.events();
    assert_eq!(events[0].get_u64("value"), Some(5));
    assert!(events[1].payload().is_empty());
}
