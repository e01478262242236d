// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use switchyard_bus::{Listener, Subscription};
use switchyard_types::{Event, EngineCapabilities, SessionConfig, SessionStatus, Task};

use crate::error::EngineError;

pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

/// Capability-described handle to a backend (C4). An engine is a pure
/// factory for sessions; it does not itself execute tasks.
#[async_trait]
pub trait Engine: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn capabilities(&self) -> &EngineCapabilities;

    /// Constructs a new session bound to this engine. Implementations that
    /// advertise `concurrent_sessions = false` must serialize internally or
    /// document that callers are responsible for serializing.
    async fn create_session(
        &self,
        config: Option<SessionConfig>,
    ) -> Result<Arc<dyn Session>, EngineError>;

    /// Cheap liveness probe; does not mutate state.
    async fn is_available(&self) -> bool;

    /// Idempotent setup hook, run at most meaningfully once by the
    /// registry but safe to call repeatedly.
    async fn initialize(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Idempotent teardown hook.
    async fn cleanup(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A long-lived conversational context that executes one task at a time
/// and emits a normalized event stream (C5).
#[async_trait]
pub trait Session: Send + Sync {
    fn id(&self) -> &str;

    fn status(&self) -> SessionStatus;

    fn config(&self) -> &SessionConfig;

    /// Runs `task` to completion, producing a lazily-iterated event
    /// stream. Implementations MUST emit `session_start` first and
    /// `session_end` last, and MUST be safe to iterate exactly once. A
    /// session that is not idle refuses with [`EngineError::Busy`].
    async fn run(&self, task: Task) -> Result<EventStream, EngineError>;

    /// Signals cancellation of the named task (or the session's current
    /// task if `None`). Idempotent; a no-op on an idle session.
    async fn abort(&self, task_id: Option<&str>);

    /// Mirrors every event produced by `run` to `listener`, in addition to
    /// whatever the caller does with the stream returned by `run` itself.
    fn on_event(&self, listener: Listener) -> Subscription;

    /// Terminates the session and releases any underlying resource.
    /// Subsequent `run` calls must fail with [`EngineError::Disposed`].
    async fn dispose(&self);
}
