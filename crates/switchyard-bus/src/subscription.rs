// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use switchyard_types::Event;

/// A subscriber callback. Invoked synchronously from [`crate::EventBus::publish`];
/// implementations that need to do I/O must hand off to their own task and
/// return promptly (spec.md §4.1/§5).
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Options controlling how a subscription is delivered and removed.
#[derive(Clone)]
pub struct SubscribeOptions {
    /// Removed after its first invocation (successful or not).
    pub once: bool,
    /// Higher runs first; ties broken by registration order. Default 0.
    pub priority: i32,
    /// Tag used for bulk removal via [`crate::EventBus::unsubscribe_namespace`].
    pub namespace: Option<String>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            once: false,
            priority: 0,
            namespace: None,
        }
    }
}

impl SubscribeOptions {
    pub fn once() -> Self {
        Self {
            once: true,
            ..Default::default()
        }
    }

    pub fn with_priority(priority: i32) -> Self {
        Self {
            priority,
            ..Default::default()
        }
    }

    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }
}

/// One registered subscription, as stored inside a topic's listener list.
#[derive(Clone)]
pub(crate) struct Entry {
    pub id: u64,
    pub seq: u64,
    pub listener: Listener,
    pub once: bool,
    pub priority: i32,
    pub namespace: Option<String>,
}

/// Sort key: descending priority, then ascending registration order.
pub(crate) fn sort_entries(entries: &mut Vec<Entry>) {
    entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
}
