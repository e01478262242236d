// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Task Queue and Task Manager (C7): admission, scheduling, cancellation,
//! and lifecycle-event emission for units of work bound to engine sessions.
//!
//! [`TaskQueue`] is the basic FIFO variant — the caller already holds a
//! session. [`TaskManager`] sits above it: it resolves an engine and pooled
//! session itself, orders pending work by [`switchyard_types::Priority`], and
//! adds a per-task timeout and a bounded history of terminal results.

mod error;
mod manager;
mod queue;

pub use error::QueueError;
pub use manager::{
    ExecuteError, HistoryEntry, ManagerConfig, SubmitOptions, TaskManager, TaskMetadataSnapshot,
};
pub use queue::{QueueStats, TaskQueue, TaskQueueConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::Stream;

    use switchyard_bus::EventBus;
    use switchyard_engine::{
        Engine, EngineError, EngineRegistry, EventStream, RegisterOptions, Session,
    };
    use switchyard_pool::{PoolManager, SessionPoolConfig};
    use switchyard_types::{
        EngineCapabilities, Event, Priority, SessionConfig, SessionStatus, Task, TaskInput,
        TaskKind, TaskStatus,
    };

    fn task(id: &str) -> Task {
        Task::new(id, TaskKind::Chat, TaskInput::new("hi"))
    }

    // ─── TaskQueue: directly-pooled session, no engine resolution ──────────

    struct InstantSession {
        id: String,
        events: Vec<Event>,
    }

    #[async_trait]
    impl Session for InstantSession {
        fn id(&self) -> &str {
            &self.id
        }
        fn status(&self) -> SessionStatus {
            SessionStatus::Idle
        }
        fn config(&self) -> &SessionConfig {
            static DEFAULT: std::sync::OnceLock<SessionConfig> = std::sync::OnceLock::new();
            DEFAULT.get_or_init(SessionConfig::default)
        }
        async fn run(&self, _task: Task) -> Result<EventStream, EngineError> {
            let events = self.events.clone();
            let stream: Pin<Box<dyn Stream<Item = Event> + Send>> =
                Box::pin(futures::stream::iter(events));
            Ok(stream)
        }
        async fn abort(&self, _task_id: Option<&str>) {}
        fn on_event(&self, _listener: switchyard_bus::Listener) -> switchyard_bus::Subscription {
            unreachable!("not exercised by queue tests")
        }
        async fn dispose(&self) {}
    }

    struct HangingSession {
        id: String,
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
            static DEFAULT: std::sync::OnceLock<SessionConfig> = std::sync::OnceLock::new();
            DEFAULT.get_or_init(SessionConfig::default)
        }
        async fn run(&self, _task: Task) -> Result<EventStream, EngineError> {
            let stream: Pin<Box<dyn Stream<Item = Event> + Send>> =
                Box::pin(futures::stream::pending());
            Ok(stream)
        }
        async fn abort(&self, _task_id: Option<&str>) {}
        fn on_event(&self, _listener: switchyard_bus::Listener) -> switchyard_bus::Subscription {
            unreachable!("not exercised by queue tests")
        }
        async fn dispose(&self) {}
    }

    #[tokio::test]
    async fn enqueue_runs_a_task_through_to_completion() {
        let bus = Arc::new(EventBus::new(100));
        let history = bus.history(None);
        assert!(history.is_empty());

        let queue = TaskQueue::new(bus.clone(), TaskQueueConfig::default());
        let session: Arc<dyn Session> = Arc::new(InstantSession {
            id: "s1".to_string(),
            events: vec![Event::Token { text: "hi".to_string() }],
        });
        queue.enqueue(task("t1"), session);
        queue.wait_idle().await;

        assert_eq!(queue.status("t1"), None);
        let completed = bus
            .history(Some(&|e: &Event| matches!(e, Event::TaskCompleted { .. })))
            .len();
        assert_eq!(completed, 1);
    }

    #[tokio::test]
    async fn max_parallel_bounds_concurrently_running_tasks() {
        let bus = Arc::new(EventBus::new(100));
        let queue = TaskQueue::new(bus, TaskQueueConfig { max_parallel: 1 });
        let a: Arc<dyn Session> = Arc::new(HangingSession { id: "a".to_string() });
        let b: Arc<dyn Session> = Arc::new(HangingSession { id: "b".to_string() });
        queue.enqueue(task("a"), a);
        queue.enqueue(task("b"), b);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let stats = queue.stats();
        assert_eq!(stats.running, 1);
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn cancel_removes_a_pending_task() {
        let bus = Arc::new(EventBus::new(100));
        let queue = TaskQueue::new(bus, TaskQueueConfig { max_parallel: 1 });
        let a: Arc<dyn Session> = Arc::new(HangingSession { id: "a".to_string() });
        let b: Arc<dyn Session> = Arc::new(HangingSession { id: "b".to_string() });
        queue.enqueue(task("a"), a);
        queue.enqueue(task("b"), b);

        assert!(queue.cancel("b"));
        assert_eq!(queue.status("b"), None);
        assert_eq!(queue.stats().pending, 0);
    }

    #[tokio::test]
    async fn clear_cancels_every_pending_task() {
        let bus = Arc::new(EventBus::new(100));
        let queue = TaskQueue::new(bus, TaskQueueConfig { max_parallel: 1 });
        let a: Arc<dyn Session> = Arc::new(HangingSession { id: "a".to_string() });
        let b: Arc<dyn Session> = Arc::new(HangingSession { id: "b".to_string() });
        queue.enqueue(task("a"), a);
        queue.enqueue(task("b"), b);

        assert_eq!(queue.clear(), 1);
        assert_eq!(queue.stats().pending, 0);
    }

    // ─── TaskManager: engine/pool resolution + priority + history ──────────

    struct MockEngine {
        id: String,
        next_id: AtomicU64,
    }

    #[async_trait]
    impl Engine for MockEngine {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            "Mock Engine"
        }
        fn capabilities(&self) -> &EngineCapabilities {
            static CAPS: std::sync::OnceLock<EngineCapabilities> = std::sync::OnceLock::new();
            CAPS.get_or_init(|| EngineCapabilities {
                supported_kinds: vec![],
                streaming: true,
                concurrent_sessions: true,
                task_abort: true,
                max_concurrent_sessions: 0,
                description: "mock".into(),
                version: "0.0.0".into(),
            })
        }
        async fn create_session(
            &self,
            config: Option<SessionConfig>,
        ) -> Result<Arc<dyn Session>, EngineError> {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(InstantSession {
                id: format!("{}-session-{n}", self.id),
                events: vec![],
            }))
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    /// Every session it creates blocks forever in `run`, so it can occupy a
    /// manager's single running slot for as long as a test needs.
    struct HangingEngine {
        id: String,
        next_id: AtomicU64,
    }

    #[async_trait]
    impl Engine for HangingEngine {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            "Hanging Engine"
        }
        fn capabilities(&self) -> &EngineCapabilities {
            static CAPS: std::sync::OnceLock<EngineCapabilities> = std::sync::OnceLock::new();
            CAPS.get_or_init(|| EngineCapabilities {
                supported_kinds: vec![],
                streaming: true,
                concurrent_sessions: true,
                task_abort: true,
                max_concurrent_sessions: 0,
                description: "hanging".into(),
                version: "0.0.0".into(),
            })
        }
        async fn create_session(
            &self,
            _config: Option<SessionConfig>,
        ) -> Result<Arc<dyn Session>, EngineError> {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(HangingSession { id: format!("{}-session-{n}", self.id) }))
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    fn manager() -> (TaskManager, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(100));
        let registry = Arc::new(EngineRegistry::new(bus.clone()));
        registry.register(
            Arc::new(MockEngine { id: "mock".to_string(), next_id: AtomicU64::new(0) }),
            RegisterOptions { auto_initialize: false, as_default: true },
        );
        let pools = Arc::new(PoolManager::new(SessionPoolConfig::default()));
        let manager = TaskManager::new(bus.clone(), registry, pools, ManagerConfig::default());
        (manager, bus)
    }

    #[tokio::test]
    async fn submit_resolves_the_default_engine_and_completes() {
        let (manager, _bus) = manager();
        manager.submit(task("t1"), SubmitOptions::default());
        for _ in 0..50 {
            if manager.status("t1").is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(manager.history(None).len(), 1);
        assert!(manager.history(None)[0].success);
    }

    #[tokio::test]
    async fn execute_resolves_ok_on_success() {
        let (manager, _bus) = manager();
        let result = manager.execute(task("t1"), SubmitOptions::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn priority_dominance_starts_urgent_before_earlier_normal() {
        let bus = Arc::new(EventBus::new(100));
        let registry = Arc::new(EngineRegistry::new(bus.clone()));
        registry.register(
            Arc::new(HangingEngine { id: "hang".to_string(), next_id: AtomicU64::new(0) }),
            RegisterOptions { auto_initialize: false, as_default: false },
        );
        registry.register(
            Arc::new(MockEngine { id: "mock".to_string(), next_id: AtomicU64::new(0) }),
            RegisterOptions { auto_initialize: false, as_default: true },
        );
        let pools = Arc::new(PoolManager::new(SessionPoolConfig::default()));
        let manager = TaskManager::new(
            bus,
            registry,
            pools,
            ManagerConfig { max_parallel: 1, ..ManagerConfig::default() },
        );

        // Occupy the single slot with a task whose session hangs, so both
        // follow-up submissions stay queued long enough to compare order.
        manager.submit(
            Task::new("blocker", TaskKind::Chat, TaskInput::new("hang")).with_engine("hang"),
            SubmitOptions::default(),
        );
        tokio::time::sleep(Duration::from_millis(5)).await;

        manager.submit(task("normal-1"), SubmitOptions::default());
        manager.submit(
            task("urgent-1"),
            SubmitOptions { priority: Priority::Urgent, timeout_ms: None },
        );

        let queued = manager.queued_tasks();
        let ids: Vec<&str> = queued.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"urgent-1"));
    }

    #[tokio::test]
    async fn abort_of_unknown_task_returns_false() {
        let (manager, _bus) = manager();
        assert!(!manager.abort("does-not-exist"));
    }

    #[tokio::test]
    async fn clear_queue_cancels_pending_without_touching_running() {
        let bus = Arc::new(EventBus::new(100));
        let registry = Arc::new(EngineRegistry::new(bus.clone()));
        registry.register(
            Arc::new(HangingEngine { id: "hang".to_string(), next_id: AtomicU64::new(0) }),
            RegisterOptions { auto_initialize: false, as_default: false },
        );
        registry.register(
            Arc::new(MockEngine { id: "mock".to_string(), next_id: AtomicU64::new(0) }),
            RegisterOptions { auto_initialize: false, as_default: true },
        );
        let pools = Arc::new(PoolManager::new(SessionPoolConfig::default()));
        let manager = TaskManager::new(
            bus,
            registry,
            pools,
            ManagerConfig { max_parallel: 1, ..ManagerConfig::default() },
        );
        manager.submit(
            Task::new("blocker", TaskKind::Chat, TaskInput::new("hang")).with_engine("hang"),
            SubmitOptions::default(),
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.submit(task("queued-1"), SubmitOptions::default());

        assert_eq!(manager.clear_queue(), 1);
        assert_eq!(manager.status("blocker"), Some(TaskStatus::Running));
    }

    #[test]
    fn task_queue_config_defaults_to_one_parallel_task() {
        assert_eq!(TaskQueueConfig::default().max_parallel, 1);
    }

    #[test]
    fn manager_config_defaults() {
        let cfg = ManagerConfig::default();
        assert_eq!(cfg.max_parallel, 1);
        assert_eq!(cfg.default_timeout_ms, 300_000);
        assert_eq!(cfg.max_history, 200);
    }
}
