//! # Panel events published on the bus.
//!
//! An [`Event`] is a hierarchical dotted type string (`input.*`, `output.*`,
//! `system.*`) plus a JSON object payload. Well-known types live in [`kinds`].
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Events from one publishing thread are delivered in publish order; across threads,
//! `seq` reflects arrival order at the bus.
//!
//! ## Example
//! ```rust
//! use panelvisor::events::{Event, kinds};
//! use serde_json::json;
//!
//! let ev = Event::new(kinds::SWITCH_CHANGED)
//!     .with("old_value", 0)
//!     .with("new_value", 1);
//!
//! assert_eq!(ev.event_type(), "input.switch.changed");
//! assert_eq!(ev.get_u64("new_value"), Some(1));
//! assert_eq!(ev.payload().get("old_value"), Some(&json!(0)));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use serde_json::{Map, Value};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Event payload: a JSON object.
pub type Payload = Map<String, Value>;

/// Exact event type strings used by the runtime.
pub mod kinds {
    /// `{old_value:int, new_value:int}`
    pub const SWITCH_CHANGED: &str = "input.switch.changed";
    /// `{button: "red"|"yellow"|"green"|"blue"}`
    pub const BUTTON_PRESSED: &str = "input.button.pressed";
    /// `{button: "red"|"yellow"|"green"|"blue"}`
    pub const BUTTON_RELEASED: &str = "input.button.released";
    /// `{}`
    pub const GO_BUTTON_PRESSED: &str = "input.go_button.pressed";

    /// `{color:string, is_on:bool}`
    pub const LED_STATE_CHANGED: &str = "output.led.state_changed";
    /// `{value:int|null}`
    pub const DISPLAY_UPDATED: &str = "output.display.updated";
    /// `{content_type:string, content:string}`
    pub const SCREEN_UPDATED: &str = "output.screen.updated";

    /// `{hardware_type:string}`
    pub const SYSTEM_STARTED: &str = "system.started";
    /// `{reason:string}`
    pub const SHUTDOWN_REQUESTED: &str = "system.shutdown.requested";
    /// `{reason:string}`
    pub const SHUTDOWN_INITIATED: &str = "system.shutdown.initiated";
    /// `{switch_value:int}`
    pub const APP_LAUNCH_REQUESTED: &str = "system.app.launch.requested";
    /// `{app_name:string, switch_value:int}`
    pub const APP_STARTED: &str = "system.app.started";
    /// `{app_name:string, reason:string}`
    pub const APP_FINISHED: &str = "system.app.finished";
    /// `{app_name:string, error:string}`
    pub const APP_ERROR: &str = "system.app.error";
}

/// Runtime event with sequence number, timestamp, type and payload.
///
/// Cheap to clone: the type string is shared. Immutable once published.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Globally unique sequence number (monotonic).
    pub seq: u64,
    /// Wall-clock timestamp (for logs).
    pub at: SystemTime,
    event_type: Arc<str>,
    payload: Payload,
}

impl Event {
    /// Creates an event with an empty payload.
    pub fn new(event_type: impl AsRef<str>) -> Self {
        Self::with_payload(event_type, Payload::new())
    }

    /// Creates an event carrying `payload`.
    pub fn with_payload(event_type: impl AsRef<str>, payload: Payload) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            event_type: Arc::from(event_type.as_ref()),
            payload,
        }
    }

    /// Creates an event from an arbitrary JSON value.
    ///
    /// - object → used as the payload;
    /// - `null` → empty payload;
    /// - anything else → `{"value": v}`.
    pub fn from_value(event_type: impl AsRef<str>, value: Value) -> Self {
        let payload = match value {
            Value::Object(map) => map,
            Value::Null => Payload::new(),
            other => {
                let mut map = Payload::new();
                map.insert("value".into(), other);
                map
            }
        };
        Self::with_payload(event_type, payload)
    }

    /// Adds (or replaces) a payload field.
    #[inline]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Dotted event type.
    #[inline]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Event payload.
    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Payload field by key.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// String payload field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Unsigned integer payload field.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.payload.get(key).and_then(Value::as_u64)
    }

    /// Boolean payload field.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.payload.get(key).and_then(Value::as_bool)
    }

    /// True if the event type equals `event_type`.
    #[inline]
    pub fn is(&self, event_type: &str) -> bool {
        &*self.event_type == event_type
    }
}

/// True when every key in `filter` equals the corresponding payload key.
///
/// A key absent from the payload is a non-match. An empty filter matches everything.
pub fn filter_matches(filter: &Payload, payload: &Payload) -> bool {
    filter
        .iter()
        .all(|(key, expected)| payload.get(key) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn obj(v: Value) -> Payload {
        match v {
            Value::Object(m) => m,
            _ => Payload::new(),
        }
    }

    #[test]
    fn seq_is_monotonic() {
        let a = Event::new(kinds::GO_BUTTON_PRESSED);
        let b = Event::new(kinds::GO_BUTTON_PRESSED);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn from_value_normalises_payloads() {
        assert!(Event::from_value("x", Value::Null).payload().is_empty());
        assert_eq!(
            Event::from_value("x", json!({"a": 1})).get_u64("a"),
            Some(1)
        );
        assert_eq!(Event::from_value("x", json!("hi")).get_str("value"), Some("hi"));
    }

    #[test]
    fn filter_requires_present_and_equal_keys() {
        let payload = obj(json!({"button": "red", "extra": true}));
        assert!(filter_matches(&obj(json!({})), &payload));
        assert!(filter_matches(&obj(json!({"button": "red"})), &payload));
        assert!(!filter_matches(&obj(json!({"button": "blue"})), &payload));
        assert!(!filter_matches(&obj(json!({"missing": null})), &payload));
        assert!(!filter_matches(
            &obj(json!({"button": "red", "extra": false})),
            &payload
        ));
    }

    proptest! {
        #[test]
        fn filter_of_own_subset_always_matches(
            entries in proptest::collection::btree_map("[a-z]{1,4}", 0u64..100, 0..6),
            take in 0usize..6,
        ) {
            let payload: Payload = entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let filter: Payload = payload.iter().take(take).map(|(k, v)| (k.clone(), v.clone())).collect();
            prop_assert!(filter_matches(&filter, &payload));
        }

        #[test]
        fn filter_with_foreign_key_never_matches(
            entries in proptest::collection::btree_map("[a-z]{1,4}", 0u64..100, 0..6),
        ) {
            let payload: Payload = entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let mut filter = Payload::new();
            filter.insert("NOT_PRESENT".into(), json!(1));
            prop_assert!(!filter_matches(&filter, &payload));
        }
    }
}
