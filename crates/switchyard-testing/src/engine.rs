// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
#[cfg(test)]
use futures::StreamExt;

use switchyard_bus::{EventBus, Listener, Subscription};
use switchyard_engine::{Engine, EngineError, EventStream, Session};
use switchyard_types::{
    Event, EngineCapabilities, SessionConfig, SessionEndReason, SessionStatus, Task, TaskKind,
};

fn caps(description: &str) -> EngineCapabilities {
    EngineCapabilities {
        supported_kinds: vec![
            TaskKind::Chat,
            TaskKind::Refactor,
            TaskKind::Analyze,
            TaskKind::Generate,
        ],
        streaming: true,
        concurrent_sessions: true,
        task_abort: true,
        max_concurrent_sessions: 0,
        description: description.to_string(),
        version: "0.1.0".to_string(),
    }
}

fn wrap_with_session_markers(session_id: &str, body: Vec<Event>) -> Vec<Event> {
    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(Event::SessionStart {
        session_id: session_id.to_string(),
    });
    out.extend(body);
    out.push(Event::SessionEnd {
        session_id: session_id.to_string(),
        reason: SessionEndReason::Completed,
    });
    out
}

/// Deterministic engine that echoes the task's prompt back as a single
/// `assistant_message`. Equivalent to `sven_model::MockProvider` — a fixed,
/// argument-free response shape for tests that don't care about content.
pub struct MockEngine {
    id: String,
    caps: EngineCapabilities,
    next_session: AtomicU64,
}

impl MockEngine {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            caps: caps("deterministic echo engine for tests"),
            next_session: AtomicU64::new(1),
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new("mock")
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> &EngineCapabilities {
        &self.caps
    }

    async fn create_session(
        &self,
        config: Option<SessionConfig>,
    ) -> Result<Arc<dyn Session>, EngineError> {
        let n = self.next_session.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(EchoSession::new(
            format!("{}-session-{n}", self.id),
            config.unwrap_or_default(),
        )))
    }

    async fn is_available(&self) -> bool {
        true
    }
}

struct EchoSession {
    id: String,
    config: SessionConfig,
    status: Mutex<SessionStatus>,
    mirror: EventBus,
}

impl EchoSession {
    fn new(id: String, config: SessionConfig) -> Self {
        Self {
            id,
            config,
            status: Mutex::new(SessionStatus::Idle),
            mirror: EventBus::new(64),
        }
    }
}

#[async_trait]
impl Session for EchoSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> SessionStatus {
        *self.status.lock().expect("session status lock poisoned")
    }

    fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn run(&self, task: Task) -> Result<EventStream, EngineError> {
        {
            let mut status = self.status.lock().expect("session status lock poisoned");
            if *status != SessionStatus::Idle {
                return Err(EngineError::Busy(self.id.clone()));
            }
            *status = SessionStatus::Running;
        }
        let reply = format!("MOCK: {}", task.input.prompt);
        let body = vec![
            Event::AssistantMessage {
                content: reply.clone(),
                is_delta: false,
                tool_calls: None,
            },
            Event::Result {
                output: serde_json::Value::String(reply),
            },
        ];
        let events = wrap_with_session_markers(&self.id, body);
        for event in &events {
            self.mirror.publish(event.clone());
        }
        // All events are produced eagerly above, so the session is idle again
        // by the time the caller starts iterating the returned stream — this
        // lets the pool recycle it into a later `acquire()` for a fresh task.
        *self.status.lock().expect("session status lock poisoned") = SessionStatus::Idle;
        Ok(Box::pin(stream::iter(events)) as EventStream)
    }

    async fn abort(&self, _task_id: Option<&str>) {}

    fn on_event(&self, listener: Listener) -> Subscription {
        self.mirror
            .subscribe(switchyard_types::WILDCARD_TOPIC, listener, Default::default())
    }

    async fn dispose(&self) {
        *self.status.lock().expect("session status lock poisoned") = SessionStatus::Disposed;
    }
}

/// A pre-scripted engine. Each call to `create_session` draws the next
/// script off the shared queue; each call to `run` on that session consumes
/// one script and emits its events wrapped in `session_start`/`session_end`.
/// Mirrors `sven_model::ScriptedMockProvider`.
pub struct ScriptedEngine {
    id: String,
    caps: EngineCapabilities,
    scripts: Arc<Mutex<Vec<Vec<Event>>>>,
    next_session: AtomicU64,
}

impl ScriptedEngine {
    /// Builds an engine that hands out sessions in order from `scripts`; the
    /// outer `Vec` is the ordered list of sessions, the inner `Vec` the body
    /// events (excluding `session_start`/`session_end`, which are added
    /// automatically) that session's single `run` call emits.
    pub fn new(id: impl Into<String>, scripts: Vec<Vec<Event>>) -> Self {
        Self {
            id: id.into(),
            caps: caps("scripted engine for tests"),
            scripts: Arc::new(Mutex::new(scripts)),
            next_session: AtomicU64::new(1),
        }
    }

    /// Convenience: every session returns the same fixed body.
    pub fn repeating(id: impl Into<String>, body: Vec<Event>) -> RepeatingScriptedEngine {
        RepeatingScriptedEngine {
            id: id.into(),
            caps: caps("scripted engine for tests"),
            body,
            next_session: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &EngineCapabilities {
        &self.caps
    }

    async fn create_session(
        &self,
        config: Option<SessionConfig>,
    ) -> Result<Arc<dyn Session>, EngineError> {
        let n = self.next_session.fetch_add(1, Ordering::Relaxed);
        let script = {
            let mut scripts = self.scripts.lock().expect("scripts lock poisoned");
            if scripts.is_empty() {
                vec![Event::Result {
                    output: serde_json::Value::Null,
                }]
            } else {
                scripts.remove(0)
            }
        };
        Ok(Arc::new(ScriptedSession::new(
            format!("{}-session-{n}", self.id),
            config.unwrap_or_default(),
            script,
        )))
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// A scripted engine whose every session replays the same body, useful when
/// a test only needs a fixed canned response without per-call variation.
pub struct RepeatingScriptedEngine {
    id: String,
    caps: EngineCapabilities,
    body: Vec<Event>,
    next_session: AtomicU64,
}

#[async_trait]
impl Engine for RepeatingScriptedEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &EngineCapabilities {
        &self.caps
    }

    async fn create_session(
        &self,
        config: Option<SessionConfig>,
    ) -> Result<Arc<dyn Session>, EngineError> {
        let n = self.next_session.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(ScriptedSession::new(
            format!("{}-session-{n}", self.id),
            config.unwrap_or_default(),
            self.body.clone(),
        )))
    }

    async fn is_available(&self) -> bool {
        true
    }
}

struct ScriptedSession {
    id: String,
    config: SessionConfig,
    status: Mutex<SessionStatus>,
    script: Mutex<Option<Vec<Event>>>,
    mirror: EventBus,
}

impl ScriptedSession {
    fn new(id: String, config: SessionConfig, script: Vec<Event>) -> Self {
        Self {
            id,
            config,
            status: Mutex::new(SessionStatus::Idle),
            script: Mutex::new(Some(script)),
            mirror: EventBus::new(64),
        }
    }
}

#[async_trait]
impl Session for ScriptedSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> SessionStatus {
        *self.status.lock().expect("session status lock poisoned")
    }

    fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn run(&self, _task: Task) -> Result<EventStream, EngineError> {
        {
            let mut status = self.status.lock().expect("session status lock poisoned");
            if *status != SessionStatus::Idle {
                return Err(EngineError::Busy(self.id.clone()));
            }
            *status = SessionStatus::Running;
        }
        let body = self
            .script
            .lock()
            .expect("script lock poisoned")
            .take()
            .unwrap_or_default();
        let events = wrap_with_session_markers(&self.id, body);
        for event in &events {
            self.mirror.publish(event.clone());
        }
        *self.status.lock().expect("session status lock poisoned") = SessionStatus::Idle;
        Ok(Box::pin(stream::iter(events)) as EventStream)
    }

    async fn abort(&self, _task_id: Option<&str>) {}

    fn on_event(&self, listener: Listener) -> Subscription {
        self.mirror
            .subscribe(switchyard_types::WILDCARD_TOPIC, listener, Default::default())
    }

    async fn dispose(&self) {
        *self.status.lock().expect("session status lock poisoned") = SessionStatus::Disposed;
    }
}

/// A session whose stream never resolves, for tests that need to hold a
/// pool/queue slot open deterministically.
pub struct HangingSession {
    id: String,
    config: SessionConfig,
}

impl HangingSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: SessionConfig::default(),
        }
    }
}

#[async_trait]
impl Session for HangingSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> SessionStatus {
        SessionStatus::Running
    }

    fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn run(&self, _task: Task) -> Result<EventStream, EngineError> {
        Ok(Box::pin(stream::pending()) as EventStream)
    }

    async fn abort(&self, _task_id: Option<&str>) {}

    fn on_event(&self, _listener: Listener) -> Subscription {
        unreachable!("hanging session never publishes")
    }

    async fn dispose(&self) {}
}

/// Engine that always hands out a [`HangingSession`], for tests that need a
/// slot permanently occupied.
pub struct HangingEngine {
    id: String,
    caps: EngineCapabilities,
    next_session: AtomicU64,
}

impl HangingEngine {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            caps: caps("never-completing engine for tests"),
            next_session: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Engine for HangingEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "hanging"
    }

    fn capabilities(&self) -> &EngineCapabilities {
        &self.caps
    }

    async fn create_session(
        &self,
        _config: Option<SessionConfig>,
    ) -> Result<Arc<dyn Session>, EngineError> {
        let n = self.next_session.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(HangingSession::new(format!(
            "{}-session-{n}",
            self.id
        ))))
    }

    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_types::TaskInput;

    fn task(prompt: &str) -> Task {
        Task::new("t1", TaskKind::Chat, TaskInput::new(prompt))
    }

    #[tokio::test]
    async fn mock_engine_echoes_prompt() {
        let engine = MockEngine::new("mock");
        let session = engine.create_session(None).await.unwrap();
        let mut stream = session.run(task("hello")).await.unwrap();
        let mut saw_echo = false;
        while let Some(event) = stream.next().await {
            if let Event::AssistantMessage { content, .. } = event {
                assert!(content.contains("hello"));
                saw_echo = true;
            }
        }
        assert!(saw_echo);
    }

    #[tokio::test]
    async fn mock_engine_wraps_with_session_markers() {
        let engine = MockEngine::new("mock");
        let session = engine.create_session(None).await.unwrap();
        let events: Vec<Event> = session.run(task("hi")).await.unwrap().collect().await;
        assert!(matches!(events.first(), Some(Event::SessionStart { .. })));
        assert!(matches!(events.last(), Some(Event::SessionEnd { .. })));
    }

    #[tokio::test]
    async fn scripted_engine_consumes_scripts_in_order() {
        let engine = ScriptedEngine::new(
            "scripted",
            vec![
                vec![Event::Token {
                    text: "first".into(),
                }],
                vec![Event::Token {
                    text: "second".into(),
                }],
            ],
        );
        let s1 = engine.create_session(None).await.unwrap();
        let events1: Vec<Event> = s1.run(task("x")).await.unwrap().collect().await;
        assert!(events1
            .iter()
            .any(|e| matches!(e, Event::Token { text } if text == "first")));

        let s2 = engine.create_session(None).await.unwrap();
        let events2: Vec<Event> = s2.run(task("x")).await.unwrap().collect().await;
        assert!(events2
            .iter()
            .any(|e| matches!(e, Event::Token { text } if text == "second")));
    }

    #[tokio::test]
    async fn scripted_engine_falls_back_when_exhausted() {
        let engine = ScriptedEngine::new("scripted", vec![]);
        let session = engine.create_session(None).await.unwrap();
        let events: Vec<Event> = session.run(task("x")).await.unwrap().collect().await;
        assert!(events.iter().any(|e| matches!(e, Event::Result { .. })));
    }

    #[tokio::test]
    async fn session_is_idle_again_after_a_completed_run() {
        let engine = MockEngine::new("mock");
        let session = engine.create_session(None).await.unwrap();
        let _first = session.run(task("a")).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        // The pool relies on this to recycle the session into a later task.
        let second = session.run(task("b")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn hanging_session_stream_never_completes() {
        let engine = HangingEngine::new("hang");
        let session = engine.create_session(None).await.unwrap();
        let mut stream = session.run(task("x")).await.unwrap();
        let next = tokio::time::timeout(std::time::Duration::from_millis(20), stream.next()).await;
        assert!(next.is_err(), "hanging session must not yield any event");
    }
}
