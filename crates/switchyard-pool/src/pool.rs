// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::warn;

use switchyard_engine::{Engine, Session};
use switchyard_types::SessionConfig;

use crate::config::SessionPoolConfig;
use crate::error::PoolError;

struct PooledEntry {
    session: Arc<dyn Session>,
    in_use: bool,
    created_at: Instant,
    last_used_at: Instant,
    use_count: u64,
}

/// Point-in-time view of one pooled session, for inspection/debugging.
#[derive(Debug, Clone)]
pub struct PooledSessionInfo {
    pub id: String,
    pub in_use: bool,
    pub age: Duration,
    pub idle_for: Duration,
    pub use_count: u64,
}

/// Monotonic counters plus current gauges (spec.md §4.5, "Stats"). Gauges
/// (`total`/`idle`/`in_use`) are a snapshot taken when the stats were
/// requested; counters accumulate for the pool's whole lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub in_use: usize,
    pub created: u64,
    pub destroyed: u64,
    pub acquired: u64,
    pub released: u64,
}

#[derive(Default)]
struct Counters {
    created: u64,
    destroyed: u64,
    acquired: u64,
    released: u64,
}

struct PoolState {
    entries: HashMap<String, PooledEntry>,
    counters: Counters,
}

impl PoolState {
    fn snapshot(&self) -> PoolStats {
        let idle = self.entries.values().filter(|e| !e.in_use).count();
        PoolStats {
            total: self.entries.len(),
            idle,
            in_use: self.entries.len() - idle,
            created: self.counters.created,
            destroyed: self.counters.destroyed,
            acquired: self.counters.acquired,
            released: self.counters.released,
        }
    }
}

fn is_expired(entry: &PooledEntry, config: &SessionPoolConfig, now: Instant) -> bool {
    if now.saturating_duration_since(entry.created_at) > config.max_session_lifetime {
        return true;
    }
    if !entry.in_use && now.saturating_duration_since(entry.last_used_at) > config.max_idle_time {
        return true;
    }
    false
}

/// Per-engine bounded cache of sessions with reuse, warmup, and expiry (C6).
pub struct SessionPool {
    engine: Arc<dyn Engine>,
    config: SessionPoolConfig,
    state: Mutex<PoolState>,
}

impl SessionPool {
    pub fn new(engine: Arc<dyn Engine>, config: SessionPoolConfig) -> Self {
        Self {
            engine,
            config,
            state: Mutex::new(PoolState {
                entries: HashMap::new(),
                counters: Counters::default(),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Sweeps expired idle sessions, then returns an idle session if one
    /// remains, else constructs a new one. Acquisition never blocks on
    /// `max_pool_size` — overflow sessions are destroyed on release instead
    /// of retained.
    pub async fn acquire(
        &self,
        config: Option<SessionConfig>,
    ) -> Result<Arc<dyn Session>, PoolError> {
        self.sweep_expired().await;

        let reused = {
            let mut state = self.state.lock().await;
            let idle_id = state
                .entries
                .iter()
                .find(|(_, e)| !e.in_use)
                .map(|(id, _)| id.clone());
            idle_id.map(|id| {
                let entry = state.entries.get_mut(&id).expect("just found");
                entry.in_use = true;
                entry.use_count += 1;
                entry.last_used_at = Instant::now();
                state.counters.acquired += 1;
                entry.session.clone()
            })
        };

        if let Some(session) = reused {
            return Ok(session);
        }

        let session = self.engine.create_session(config).await?;
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.entries.insert(
            session.id().to_string(),
            PooledEntry {
                session: session.clone(),
                in_use: true,
                created_at: now,
                last_used_at: now,
                use_count: 1,
            },
        );
        state.counters.created += 1;
        state.counters.acquired += 1;
        Ok(session)
    }

    /// Marks `session` idle; destroys it instead if `dispose` was requested
    /// or the pool is currently over `max_pool_size`.
    pub async fn release(&self, session: &Arc<dyn Session>, dispose: bool) {
        let id = session.id().to_string();
        let over_capacity = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.entries.get_mut(&id) else {
                warn!(session_id = %id, "release of unknown session ignored");
                return;
            };
            entry.in_use = false;
            entry.last_used_at = Instant::now();
            state.counters.released += 1;
            state.entries.len() > self.config.max_pool_size
        };

        if dispose || over_capacity {
            self.destroy(&id).await;
        }
    }

    /// `session.abort(task_id)` followed by `release(session, false)`.
    pub async fn abort_and_release(&self, session: &Arc<dyn Session>, task_id: Option<&str>) {
        session.abort(task_id).await;
        self.release(session, false).await;
    }

    /// Creates sessions until the pool has at least `max(min_pool_size, 1)`
    /// idle entries.
    pub async fn warmup(&self, config: Option<SessionConfig>) -> Result<(), PoolError> {
        let target = self.config.min_pool_size.max(1);
        loop {
            let idle = self.idle_count().await;
            if idle >= target {
                break;
            }
            let session = self.engine.create_session(config.clone()).await?;
            let now = Instant::now();
            let mut state = self.state.lock().await;
            state.entries.insert(
                session.id().to_string(),
                PooledEntry {
                    session,
                    in_use: false,
                    created_at: now,
                    last_used_at: now,
                    use_count: 0,
                },
            );
            state.counters.created += 1;
        }
        Ok(())
    }

    /// Removes every entry; disposes idle ones when `dispose_idle` is set
    /// (in-use entries are always left for their holder to release).
    pub async fn clear(&self, dispose_idle: bool) -> usize {
        let idle_ids: Vec<String> = {
            let state = self.state.lock().await;
            state
                .entries
                .iter()
                .filter(|(_, e)| !e.in_use)
                .map(|(id, _)| id.clone())
                .collect()
        };
        if dispose_idle {
            for id in &idle_ids {
                self.destroy(id).await;
            }
        }
        idle_ids.len()
    }

    /// Disposes every session, in use or not, and empties the pool.
    pub async fn dispose(&self) {
        let ids: Vec<String> = {
            let state = self.state.lock().await;
            state.entries.keys().cloned().collect()
        };
        for id in ids {
            self.destroy(&id).await;
        }
    }

    pub async fn stats(&self) -> PoolStats {
        self.state.lock().await.snapshot()
    }

    pub async fn session_info(&self, id: &str) -> Option<PooledSessionInfo> {
        let state = self.state.lock().await;
        let entry = state.entries.get(id)?;
        let now = Instant::now();
        Some(PooledSessionInfo {
            id: id.to_string(),
            in_use: entry.in_use,
            age: now.saturating_duration_since(entry.created_at),
            idle_for: if entry.in_use {
                Duration::ZERO
            } else {
                now.saturating_duration_since(entry.last_used_at)
            },
            use_count: entry.use_count,
        })
    }

    pub async fn idle_count(&self) -> usize {
        self.state.lock().await.entries.values().filter(|e| !e.in_use).count()
    }

    pub async fn in_use_count(&self) -> usize {
        self.state.lock().await.entries.values().filter(|e| e.in_use).count()
    }

    pub async fn has_idle(&self) -> bool {
        self.idle_count().await > 0
    }

    async fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<String> = {
            let state = self.state.lock().await;
            state
                .entries
                .iter()
                .filter(|(_, e)| !e.in_use && is_expired(e, &self.config, now))
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in expired {
            self.destroy(&id).await;
        }
    }

    async fn destroy(&self, id: &str) {
        let entry = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.entries.remove(id) else {
                return;
            };
            state.counters.destroyed += 1;
            entry
        };
        entry.session.dispose().await;
    }
}
