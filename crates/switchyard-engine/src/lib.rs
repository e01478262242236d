// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Engine (C4) and Session (C5) contracts, plus the process-wide Engine
//! Registry that brokers between task submitters and concrete backends.

mod error;
mod registry;
mod session;

pub use error::EngineError;
pub use registry::{EngineDescriptor, EngineRegistry, RegisterOptions};
pub use session::{Engine, EventStream, Session};

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

static GLOBAL_REGISTRY: Lazy<RwLock<Arc<EngineRegistry>>> =
    Lazy::new(|| RwLock::new(Arc::new(EngineRegistry::new(switchyard_bus::global()))));

/// Process-wide engine registry, wired to the global event bus.
pub fn global() -> Arc<EngineRegistry> {
    GLOBAL_REGISTRY
        .read()
        .expect("global engine registry lock poisoned")
        .clone()
}

/// Replaces the global registry with a fresh, empty one bound to the
/// current global bus. Test-only escape hatch (spec.md §5, "explicit reset
/// for testing").
pub fn reset_global() {
    let mut guard = GLOBAL_REGISTRY
        .write()
        .expect("global engine registry lock poisoned");
    *guard = Arc::new(EngineRegistry::new(switchyard_bus::global()));
}
