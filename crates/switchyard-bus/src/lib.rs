// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Event Bus (C2): in-process publish/subscribe fan-out over the
//! [`switchyard_types::Event`] vocabulary, with a bounded rolling history
//! and namespace-scoped bulk unsubscribe.

mod bus;
mod channel;
mod subscription;

pub use bus::{EventBus, Subscription};
pub use channel::EventChannel;
pub use subscription::{Listener, SubscribeOptions};

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

static GLOBAL_BUS: Lazy<RwLock<Arc<EventBus>>> =
    Lazy::new(|| RwLock::new(Arc::new(EventBus::default())));

/// Process-wide default bus shared by components that don't construct
/// their own (root binary, ad hoc tooling). Library code that needs
/// deterministic isolation should construct its own `EventBus` instead.
pub fn global() -> Arc<EventBus> {
    GLOBAL_BUS.read().expect("global bus lock poisoned").clone()
}

/// Replaces the global bus with a fresh, empty one. Intended for test
/// fixtures that need a clean slate between cases that exercise the
/// global singleton.
pub fn reset_global() {
    let mut guard = GLOBAL_BUS.write().expect("global bus lock poisoned");
    *guard = Arc::new(EventBus::default());
}
