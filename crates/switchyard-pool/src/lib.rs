// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Session Pool (C6): per-engine bounded cache of sessions with reuse,
//! warmup, and idle/lifetime expiry, plus a keyed [`PoolManager`] over one
//! pool per engine.

mod config;
mod error;
mod manager;
mod pool;

pub use config::SessionPoolConfig;
pub use error::PoolError;
pub use manager::PoolManager;
pub use pool::{PooledSessionInfo, PoolStats, SessionPool};

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::Stream;

    use switchyard_engine::{Engine, EngineError, EventStream, Session};
    use switchyard_types::{EngineCapabilities, Event, SessionConfig, SessionStatus, Task};

    struct MockEngine {
        next_id: AtomicU64,
        caps: EngineCapabilities,
    }

    impl MockEngine {
        fn new() -> Self {
            Self {
                next_id: AtomicU64::new(0),
                caps: EngineCapabilities {
                    supported_kinds: vec![],
                    streaming: true,
                    concurrent_sessions: true,
                    task_abort: true,
                    max_concurrent_sessions: 0,
                    description: "mock".into(),
                    version: "0.0.0".into(),
                },
            }
        }
    }

    #[async_trait]
    impl Engine for MockEngine {
        fn id(&self) -> &str {
            "mock"
        }
        fn name(&self) -> &str {
            "Mock Engine"
        }
        fn capabilities(&self) -> &EngineCapabilities {
            &self.caps
        }
        async fn create_session(
            &self,
            config: Option<SessionConfig>,
        ) -> Result<Arc<dyn Session>, EngineError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockSession {
                id: format!("session-{id}"),
                config: config.unwrap_or_default(),
            }))
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    struct MockSession {
        id: String,
        config: SessionConfig,
    }

    #[async_trait]
    impl Session for MockSession {
        fn id(&self) -> &str {
            &self.id
        }
        fn status(&self) -> SessionStatus {
            SessionStatus::Idle
        }
        fn config(&self) -> &SessionConfig {
            &self.config
        }
        async fn run(&self, _task: Task) -> Result<EventStream, EngineError> {
            let empty: Pin<Box<dyn Stream<Item = Event> + Send>> =
                Box::pin(futures::stream::empty());
            Ok(empty)
        }
        async fn abort(&self, _task_id: Option<&str>) {}
        fn on_event(
            &self,
            _listener: switchyard_bus::Listener,
        ) -> switchyard_bus::Subscription {
            unreachable!("not exercised by pool tests")
        }
        async fn dispose(&self) {}
    }

    fn pool() -> SessionPool {
        SessionPool::new(Arc::new(MockEngine::new()), SessionPoolConfig::default())
    }

    #[tokio::test]
    async fn acquire_creates_a_new_session_when_pool_is_empty() {
        let pool = pool();
        let session = pool.acquire(None).await.unwrap();
        assert_eq!(session.id(), "session-0");
        assert_eq!(pool.in_use_count().await, 1);
        assert_eq!(pool.idle_count().await, 0);
    }

    #[tokio::test]
    async fn release_then_acquire_reuses_the_same_session() {
        let pool = pool();
        let session = pool.acquire(None).await.unwrap();
        let id = session.id().to_string();
        pool.release(&session, false).await;
        assert!(pool.has_idle().await);

        let reacquired = pool.acquire(None).await.unwrap();
        assert_eq!(reacquired.id(), id);
        assert_eq!(pool.idle_count().await, 0);
    }

    #[tokio::test]
    async fn release_over_capacity_destroys_instead_of_idling() {
        let config = SessionPoolConfig {
            max_pool_size: 1,
            ..SessionPoolConfig::default()
        };
        let pool = SessionPool::new(Arc::new(MockEngine::new()), config);
        let a = pool.acquire(None).await.unwrap();
        let b = pool.acquire(None).await.unwrap();

        // Pool now holds 2 sessions against a max of 1 — both are "over
        // capacity" until enough releases bring total back down.
        pool.release(&a, false).await;
        assert_eq!(pool.stats().await.destroyed, 1, "a exceeded max_pool_size, so it is destroyed");
        assert!(!pool.has_idle().await);

        pool.release(&b, false).await;
        assert!(pool.has_idle().await, "b released once total is back at capacity, so it idles");
        let stats = pool.stats().await;
        assert_eq!(stats.destroyed, 1);
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn release_with_dispose_flag_always_destroys() {
        let pool = pool();
        let session = pool.acquire(None).await.unwrap();
        pool.release(&session, true).await;
        assert_eq!(pool.stats().await.destroyed, 1);
        assert_eq!(pool.stats().await.total, 0);
    }

    #[tokio::test]
    async fn warmup_creates_sessions_until_min_pool_size_idle() {
        let config = SessionPoolConfig {
            min_pool_size: 3,
            ..SessionPoolConfig::default()
        };
        let pool = SessionPool::new(Arc::new(MockEngine::new()), config);
        pool.warmup(None).await.unwrap();
        assert_eq!(pool.idle_count().await, 3);
    }

    #[tokio::test]
    async fn clear_without_dispose_leaves_sessions_intact() {
        let pool = pool();
        let session = pool.acquire(None).await.unwrap();
        pool.release(&session, false).await;
        let count = pool.clear(false).await;
        assert_eq!(count, 1);
        assert_eq!(pool.idle_count().await, 1);
    }

    #[tokio::test]
    async fn clear_with_dispose_destroys_idle_sessions() {
        let pool = pool();
        let session = pool.acquire(None).await.unwrap();
        pool.release(&session, false).await;
        let count = pool.clear(true).await;
        assert_eq!(count, 1);
        assert_eq!(pool.idle_count().await, 0);
    }

    #[tokio::test]
    async fn dispose_tears_down_in_use_sessions_too() {
        let pool = pool();
        let _session = pool.acquire(None).await.unwrap();
        pool.dispose().await;
        assert_eq!(pool.stats().await.total, 0);
    }

    #[tokio::test]
    async fn session_info_reports_age_and_use_count() {
        let pool = pool();
        let session = pool.acquire(None).await.unwrap();
        let info = pool.session_info(session.id()).await.unwrap();
        assert_eq!(info.use_count, 1);
        assert!(info.in_use);
        assert!(info.age < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn pool_manager_creates_one_pool_per_engine() {
        let manager = PoolManager::new(SessionPoolConfig::default());
        let engine_a: Arc<dyn Engine> = Arc::new(MockEngine::new());
        let pool_a1 = manager.get_pool(engine_a.clone()).await;
        let pool_a2 = manager.get_pool(engine_a.clone()).await;
        assert!(Arc::ptr_eq(&pool_a1, &pool_a2));
    }

    #[tokio::test]
    async fn pool_manager_get_all_stats_covers_every_pool() {
        let manager = PoolManager::new(SessionPoolConfig::default());
        let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
        let pool = manager.get_pool(engine).await;
        pool.acquire(None).await.unwrap();

        let stats = manager.get_all_stats().await;
        assert_eq!(stats.get("mock").unwrap().total, 1);
    }
}
