//! # Subscription table
//!
//! Index of live subscriptions, consulted by the dispatch loop for every event.
//!
//! ```text
//! by_id:    SubscriptionId ─► Entry { topic, filter, handler }
//! exact:    "input.button.pressed" ─► [id, id, ...]
//! patterns: [id, ...]            ("*" and "prefix.*" topics)
//! ```
//!
//! Matching handlers are returned in registration order.

use std::collections::HashMap;
use std::fmt;

use crate::events::{Event, Payload, filter_matches};

use super::handler::HandlerRef;

/// Identifier returned by `subscribe`, used to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Event types a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    /// `"*"`: every event.
    All,
    /// `"input.*"`: every event whose type starts with `"input."`.
    Prefix(String),
    /// One exact type.
    Exact(String),
}

impl Topic {
    /// Parses a subscription pattern.
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            Topic::All
        } else if let Some(prefix) = pattern.strip_suffix(".*") {
            Topic::Prefix(format!("{prefix}."))
        } else {
            Topic::Exact(pattern.to_string())
        }
    }

    /// True if an event of type `event_type` falls under this topic.
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Topic::All => true,
            Topic::Prefix(prefix) => event_type.starts_with(prefix.as_str()),
            Topic::Exact(t) => t == event_type,
        }
    }
}

struct Entry {
    topic: Topic,
    filter: Option<Payload>,
    handler: HandlerRef,
}

#[derive(Default)]
pub(crate) struct SubscriptionTable {
    next_id: u64,
    by_id: HashMap<SubscriptionId, Entry>,
    exact: HashMap<String, Vec<SubscriptionId>>,
    patterns: Vec<SubscriptionId>,
}

impl SubscriptionTable {
    pub(crate) fn insert(
        &mut self,
        topic: Topic,
        filter: Option<Payload>,
        handler: HandlerRef,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        match &topic {
            Topic::Exact(t) => self.exact.entry(t.clone()).or_default().push(id),
            Topic::All | Topic::Prefix(_) => self.patterns.push(id),
        }
        self.by_id.insert(
            id,
            Entry {
                topic,
                filter,
                handler,
            },
        );
        id
    }

    /// Removes a subscription; returns false if it was not registered.
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(entry) = self.by_id.remove(&id) else {
            return false;
        };
        match entry.topic {
            Topic::Exact(t) => {
                if let Some(ids) = self.exact.get_mut(&t) {
                    ids.retain(|x| *x != id);
                    if ids.is_empty() {
                        self.exact.remove(&t);
                    }
                }
            }
            Topic::All | Topic::Prefix(_) => self.patterns.retain(|x| *x != id),
        }
        true
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Handlers whose topic and filter match `ev`, in registration order.
    pub(crate) fn matching(&self, ev: &Event) -> Vec<(SubscriptionId, HandlerRef)> {
        let exact = self
            .exact
            .get(ev.event_type())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut out: Vec<(SubscriptionId, HandlerRef)> = exact
            .iter()
            .chain(self.patterns.iter())
            .filter_map(|id| self.by_id.get(id).map(|e| (*id, e)))
            .filter(|(_, e)| e.topic.matches(ev.event_type()))
            .filter(|(_, e)| {
                e.filter
                    .as_ref()
                    .is_none_or(|f| filter_matches(f, ev.payload()))
            })
            .map(|(id, e)| (id, e.handler.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }
}
