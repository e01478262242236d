// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::warn;

use switchyard_bus::EventBus;
use switchyard_types::{EngineCapabilities, Event};

use crate::error::EngineError;
use crate::session::Engine;

type EngineFactory = Arc<dyn Fn() -> Arc<dyn Engine> + Send + Sync>;

/// Options controlling how [`EngineRegistry::register`] and
/// [`EngineRegistry::register_factory`] treat a newly added entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegisterOptions {
    pub auto_initialize: bool,
    pub as_default: bool,
}

/// Snapshot of one engine (live or still-factory-backed) returned by
/// [`EngineRegistry::list`].
#[derive(Debug, Clone)]
pub struct EngineDescriptor {
    pub id: String,
    pub name: String,
    pub capabilities: EngineCapabilities,
    pub initialized: bool,
    pub available: bool,
    pub is_factory: bool,
}

struct RegisteredEngine {
    engine: Arc<dyn Engine>,
    #[allow(dead_code)]
    registered_at: DateTime<Utc>,
    initialized: bool,
    available: bool,
}

struct FactoryEntry {
    factory: EngineFactory,
    options: RegisterOptions,
}

struct State {
    engines: HashMap<String, RegisteredEngine>,
    factories: HashMap<String, FactoryEntry>,
    default_id: Option<String>,
}

/// A lifecycle transition the registry reports in addition to the bus
/// progress event it always publishes alongside.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    EngineRegistered { id: String },
    EngineInitialized { id: String },
    EngineError { id: String, message: String },
    EngineUnregistered { id: String },
    DefaultChanged { id: String },
}

pub type RegistryListener = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Process-wide, lifecycle-bound keyed map from engine id to its
/// registration state, plus a parallel lazy-factory map for deferred
/// construction (C4 registry).
pub struct EngineRegistry {
    state: Arc<Mutex<State>>,
    registry_listeners: Arc<Mutex<Vec<RegistryListener>>>,
    bus: Arc<EventBus>,
}

impl EngineRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                engines: HashMap::new(),
                factories: HashMap::new(),
                default_id: None,
            })),
            registry_listeners: Arc::new(Mutex::new(Vec::new())),
            bus,
        }
    }

    pub fn on_registry_event(&self, listener: RegistryListener) {
        self.registry_listeners
            .lock()
            .expect("registry listener lock poisoned")
            .push(listener);
    }

    fn emit(&self, event: RegistryEvent) {
        let listeners = self
            .registry_listeners
            .lock()
            .expect("registry listener lock poisoned")
            .clone();
        for listener in &listeners {
            listener(&event);
        }
        let message = match &event {
            RegistryEvent::EngineRegistered { id } => format!("engine '{id}' registered"),
            RegistryEvent::EngineInitialized { id } => format!("engine '{id}' initialized"),
            RegistryEvent::EngineError { id, message } => format!("engine '{id}' error: {message}"),
            RegistryEvent::EngineUnregistered { id } => format!("engine '{id}' unregistered"),
            RegistryEvent::DefaultChanged { id } => format!("default engine is now '{id}'"),
        };
        self.bus.publish(Event::progress(message));
    }

    /// Registers `engine` directly. Re-registering an id already present
    /// is a no-op (with a warning), matching spec.md §4.3.
    pub fn register(&self, engine: Arc<dyn Engine>, options: RegisterOptions) {
        let id = engine.id().to_string();
        {
            let mut state = self.state.lock().expect("registry lock poisoned");
            if state.engines.contains_key(&id) {
                warn!(engine_id = %id, "duplicate engine registration ignored");
                return;
            }
            state.factories.remove(&id);
            state.engines.insert(
                id.clone(),
                RegisteredEngine {
                    engine: engine.clone(),
                    registered_at: Utc::now(),
                    initialized: false,
                    available: false,
                },
            );
            if options.as_default || state.default_id.is_none() {
                state.default_id = Some(id.clone());
            }
        }
        self.emit(RegistryEvent::EngineRegistered { id: id.clone() });
        if options.as_default {
            self.emit(RegistryEvent::DefaultChanged { id: id.clone() });
        }
        if options.auto_initialize {
            self.spawn_initialize(id);
        }
    }

    /// Fire-and-forget `initialize`, used when a registration asks for
    /// auto-initialization from a synchronous call site.
    fn spawn_initialize(&self, id: String) {
        let engine = match self.get(&id) {
            Some(engine) => engine,
            None => return,
        };
        let bus = self.bus.clone();
        let listeners = self.registry_listeners.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let available = engine.is_available().await;
            let result = if available { engine.initialize().await } else { Ok(()) };
            {
                let mut state = state.lock().expect("registry lock poisoned");
                if let Some(entry) = state.engines.get_mut(&id) {
                    entry.available = available && result.is_ok();
                    entry.initialized = result.is_ok();
                }
            }
            let event = match &result {
                Ok(()) if available => RegistryEvent::EngineInitialized { id: id.clone() },
                Ok(()) => RegistryEvent::EngineError {
                    id: id.clone(),
                    message: "engine reported unavailable".to_string(),
                },
                Err(err) => RegistryEvent::EngineError {
                    id: id.clone(),
                    message: err.to_string(),
                },
            };
            for listener in listeners.lock().expect("registry listener lock poisoned").iter() {
                listener(&event);
            }
            bus.publish(Event::progress(match &event {
                RegistryEvent::EngineInitialized { id } => format!("engine '{id}' initialized"),
                RegistryEvent::EngineError { id, message } => {
                    format!("engine '{id}' error: {message}")
                }
                _ => unreachable!(),
            }));
        });
    }

    /// Registers a deferred factory. The first `get(id)` materializes the
    /// engine (via `register`) and removes the factory entry.
    pub fn register_factory(
        &self,
        id: impl Into<String>,
        factory: EngineFactory,
        options: RegisterOptions,
    ) {
        let id = id.into();
        let mut state = self.state.lock().expect("registry lock poisoned");
        if state.engines.contains_key(&id) || state.factories.contains_key(&id) {
            warn!(engine_id = %id, "duplicate engine factory registration ignored");
            return;
        }
        state
            .factories
            .insert(id, FactoryEntry { factory, options });
    }

    /// Returns the engine for `id`, materializing its factory if needed.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Engine>> {
        {
            let state = self.state.lock().expect("registry lock poisoned");
            if let Some(entry) = state.engines.get(id) {
                return Some(entry.engine.clone());
            }
        }

        let factory_entry = {
            let mut state = self.state.lock().expect("registry lock poisoned");
            state.factories.remove(id)
        };
        let factory_entry = factory_entry?;
        let engine = (factory_entry.factory)();
        self.register(engine.clone(), factory_entry.options);
        Some(engine)
    }

    pub fn default(&self) -> Option<Arc<dyn Engine>> {
        let id = self
            .state
            .lock()
            .expect("registry lock poisoned")
            .default_id
            .clone()?;
        self.get(&id)
    }

    pub fn set_default(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().expect("registry lock poisoned");
        if !state.engines.contains_key(id) && !state.factories.contains_key(id) {
            return Err(EngineError::NotFound(id.to_string()));
        }
        state.default_id = Some(id.to_string());
        drop(state);
        self.emit(RegistryEvent::DefaultChanged { id: id.to_string() });
        Ok(())
    }

    pub fn default_id(&self) -> Option<String> {
        self.state.lock().expect("registry lock poisoned").default_id.clone()
    }

    /// Descriptors of both live registrations and unresolved factories.
    /// Factories are probed by a throwaway construction; a probe that
    /// panics is silently skipped.
    pub fn list(&self) -> Vec<EngineDescriptor> {
        let state = self.state.lock().expect("registry lock poisoned");
        let mut out: Vec<EngineDescriptor> = state
            .engines
            .values()
            .map(|entry| EngineDescriptor {
                id: entry.engine.id().to_string(),
                name: entry.engine.name().to_string(),
                capabilities: entry.engine.capabilities().clone(),
                initialized: entry.initialized,
                available: entry.available,
                is_factory: false,
            })
            .collect();

        for (id, factory_entry) in state.factories.iter() {
            let factory = factory_entry.factory.clone();
            let probed = catch_unwind(AssertUnwindSafe(|| factory()));
            if let Ok(engine) = probed {
                out.push(EngineDescriptor {
                    id: id.clone(),
                    name: engine.name().to_string(),
                    capabilities: engine.capabilities().clone(),
                    initialized: false,
                    available: false,
                    is_factory: true,
                });
            } else {
                warn!(engine_id = %id, "factory probe panicked during list(); skipping");
            }
        }

        out
    }

    /// Checks availability, runs `initialize` if present, and records the
    /// resulting `initialized`/`available` flags.
    pub async fn initialize(&self, id: &str) -> Result<bool, EngineError> {
        let engine = self.get(id).ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let available = engine.is_available().await;

        let result = if available {
            engine.initialize().await
        } else {
            Ok(())
        };

        let mut state = self.state.lock().expect("registry lock poisoned");
        if let Some(entry) = state.engines.get_mut(id) {
            entry.available = available && result.is_ok();
            entry.initialized = result.is_ok();
        }
        drop(state);

        match &result {
            Ok(()) if available => {
                self.emit(RegistryEvent::EngineInitialized { id: id.to_string() });
                Ok(true)
            }
            Ok(()) => {
                self.emit(RegistryEvent::EngineError {
                    id: id.to_string(),
                    message: "engine reported unavailable".to_string(),
                });
                Ok(false)
            }
            Err(err) => {
                self.emit(RegistryEvent::EngineError {
                    id: id.to_string(),
                    message: err.to_string(),
                });
                Ok(false)
            }
        }
    }

    /// Runs every registered engine's initialization concurrently. Never
    /// fails; per-engine outcomes are returned as a map.
    pub async fn initialize_all(&self) -> HashMap<String, bool> {
        let ids: Vec<String> = {
            let state = self.state.lock().expect("registry lock poisoned");
            state.engines.keys().cloned().collect()
        };
        let futures = ids.iter().map(|id| self.initialize(id));
        let results = join_all(futures).await;
        ids.into_iter()
            .zip(results)
            .map(|(id, result)| (id, result.unwrap_or(false)))
            .collect()
    }

    /// Runs `cleanup` (errors logged, not surfaced), removes the entry,
    /// and if it was the default, promotes any remaining entry.
    pub fn unregister(&self, id: &str) -> bool {
        let engine = {
            let mut state = self.state.lock().expect("registry lock poisoned");
            let Some(entry) = state.engines.remove(id) else {
                state.factories.remove(id);
                return false;
            };
            if state.default_id.as_deref() == Some(id) {
                state.default_id = state.engines.keys().next().cloned();
            }
            entry.engine
        };

        let this_bus = self.bus.clone();
        let id_owned = id.to_string();
        tokio::spawn(async move {
            if let Err(err) = engine.cleanup().await {
                warn!(engine_id = %id_owned, error = %err, "engine cleanup failed");
                this_bus.publish(Event::error(format!(
                    "engine '{id_owned}' cleanup failed: {err}"
                )));
            }
        });

        self.emit(RegistryEvent::EngineUnregistered { id: id.to_string() });
        true
    }
}
