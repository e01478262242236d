// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use switchyard_types::Event;

use crate::bus::{EventBus, Subscription};
use crate::subscription::{Listener, SubscribeOptions};

/// A namespaced view onto a shared [`EventBus`].
///
/// `subscribe` tags every registration with the channel's namespace so a
/// single [`EventChannel::dispose`] call can unwind all of them at once —
/// the pattern a session or task manager uses to detach its listeners when
/// it shuts down without disturbing anyone else's subscriptions (spec.md
/// §4.1, "channel scoping"). `publish` is a pure pass-through: namespaces
/// only affect subscription bookkeeping, never the event payload itself.
#[derive(Clone)]
pub struct EventChannel {
    bus: Arc<EventBus>,
    namespace: String,
}

impl EventChannel {
    pub fn new(bus: Arc<EventBus>, namespace: impl Into<String>) -> Self {
        Self {
            bus,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        listener: Listener,
        mut options: SubscribeOptions,
    ) -> Subscription {
        options.namespace = Some(self.namespace.clone());
        self.bus.subscribe(topic, listener, options)
    }

    pub fn publish(&self, event: Event) {
        self.bus.publish(event)
    }

    /// Removes every listener this channel has registered.
    pub fn dispose(&self) {
        self.bus.unsubscribe_namespace(&self.namespace);
    }
}
