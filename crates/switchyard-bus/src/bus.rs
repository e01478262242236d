// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use tracing::warn;

use switchyard_types::{Event, WILDCARD_TOPIC};

use crate::subscription::{sort_entries, Entry, Listener, SubscribeOptions};

const DEFAULT_MAX_HISTORY: usize = 100;

struct State {
    topics: HashMap<String, Vec<Entry>>,
    history: VecDeque<Event>,
    max_history: usize,
    next_id: u64,
    next_seq: u64,
}

impl State {
    fn bucket(&mut self, topic: &str) -> &mut Vec<Entry> {
        self.topics.entry(topic.to_string()).or_default()
    }
}

/// In-process, topic-keyed publish/subscribe bus (C2 of the spec).
///
/// Delivery for a single `publish` call is synchronous and single-threaded:
/// `publish` returns only after every surviving listener has run exactly
/// once, iterating over a snapshot taken before delivery begins so that
/// listeners may freely subscribe/unsubscribe mid-delivery (spec.md §9,
/// "Listener reentrancy"). The internal lock is never held while a listener
/// runs, matching spec.md §5's "no lock held across the yield point".
pub struct EventBus {
    state: Mutex<State>,
}

impl EventBus {
    pub fn new(max_history: usize) -> Self {
        Self {
            state: Mutex::new(State {
                topics: HashMap::new(),
                history: VecDeque::new(),
                max_history,
                next_id: 1,
                next_seq: 1,
            }),
        }
    }

    /// A handle identifying one subscription, used to unsubscribe.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        listener: Listener,
        options: SubscribeOptions,
    ) -> Subscription {
        let topic = topic.into();
        let mut state = self.state.lock().expect("event bus mutex poisoned");
        let id = state.next_id;
        state.next_id += 1;
        let seq = state.next_seq;
        state.next_seq += 1;
        let entry = Entry {
            id,
            seq,
            listener,
            once: options.once,
            priority: options.priority,
            namespace: options.namespace,
        };
        let bucket = state.bucket(&topic);
        bucket.push(entry);
        sort_entries(bucket);
        Subscription { id, topic }
    }

    pub fn subscribe_once(
        &self,
        topic: impl Into<String>,
        listener: Listener,
        mut options: SubscribeOptions,
    ) -> Subscription {
        options.once = true;
        self.subscribe(topic, listener, options)
    }

    /// Removes a single subscription. Idempotent: removing an id that is
    /// already gone is a no-op.
    pub fn unsubscribe(&self, sub: &Subscription) {
        let mut state = self.state.lock().expect("event bus mutex poisoned");
        if let Some(bucket) = state.topics.get_mut(&sub.topic) {
            bucket.retain(|e| e.id != sub.id);
        }
    }

    /// Removes every subscription (on any topic) registered with the given
    /// namespace.
    pub fn unsubscribe_namespace(&self, namespace: &str) {
        let mut state = self.state.lock().expect("event bus mutex poisoned");
        for bucket in state.topics.values_mut() {
            bucket.retain(|e| e.namespace.as_deref() != Some(namespace));
        }
    }

    /// Records the event in history, then delivers it to exact-topic
    /// subscribers followed by wildcard subscribers.
    pub fn publish(&self, event: Event) {
        let topic = event.topic().to_string();

        let (exact, wildcard) = {
            let mut state = self.state.lock().expect("event bus mutex poisoned");
            state.history.push_back(event.clone());
            while state.history.len() > state.max_history {
                state.history.pop_front();
            }
            let exact = state.topics.get(&topic).cloned().unwrap_or_default();
            let wildcard = state.topics.get(WILDCARD_TOPIC).cloned().unwrap_or_default();
            (exact, wildcard)
        };

        let mut fired_once_ids: Vec<(String, u64)> = Vec::new();

        for entry in exact.iter().chain(wildcard.iter()) {
            let listener = entry.listener.clone();
            let result = catch_unwind(AssertUnwindSafe(|| listener(&event)));
            if result.is_err() {
                warn!(topic = %topic, "event bus listener panicked; continuing delivery");
            }
            if entry.once {
                let owning_topic = if exact.iter().any(|e| e.id == entry.id) {
                    topic.clone()
                } else {
                    WILDCARD_TOPIC.to_string()
                };
                fired_once_ids.push((owning_topic, entry.id));
            }
        }

        if !fired_once_ids.is_empty() {
            let mut state = self.state.lock().expect("event bus mutex poisoned");
            for (t, id) in fired_once_ids {
                if let Some(bucket) = state.topics.get_mut(&t) {
                    bucket.retain(|e| e.id != id);
                }
            }
        }
    }

    /// Ordered (oldest to newest) snapshot of recent published events,
    /// optionally filtered.
    pub fn history(&self, filter: Option<&dyn Fn(&Event) -> bool>) -> Vec<Event> {
        let state = self.state.lock().expect("event bus mutex poisoned");
        match filter {
            Some(f) => state.history.iter().filter(|e| f(e)).cloned().collect(),
            None => state.history.iter().cloned().collect(),
        }
    }

    /// Removes all subscriptions on every topic. History is untouched.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("event bus mutex poisoned");
        state.topics.clear();
    }

    pub fn clear_history(&self) {
        let mut state = self.state.lock().expect("event bus mutex poisoned");
        state.history.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

/// Idempotent unsubscribe handle returned by [`EventBus::subscribe`].
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    topic: String,
}
