// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use switchyard_engine::Engine;
use switchyard_types::SessionConfig;

use crate::config::SessionPoolConfig;
use crate::error::PoolError;
use crate::pool::{PoolStats, SessionPool};

/// Keyed map from engine id to its pool (spec.md §4.5, "Pool Manager").
pub struct PoolManager {
    pools: Mutex<HashMap<String, Arc<SessionPool>>>,
    default_config: SessionPoolConfig,
}

impl PoolManager {
    pub fn new(default_config: SessionPoolConfig) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            default_config,
        }
    }

    /// Returns the pool for `engine`, creating one with the manager's
    /// default config if none exists yet.
    pub async fn get_pool(&self, engine: Arc<dyn Engine>) -> Arc<SessionPool> {
        let mut pools = self.pools.lock().await;
        pools
            .entry(engine.id().to_string())
            .or_insert_with(|| Arc::new(SessionPool::new(engine, self.default_config)))
            .clone()
    }

    pub async fn remove_pool(&self, engine_id: &str) -> Option<Arc<SessionPool>> {
        self.pools.lock().await.remove(engine_id)
    }

    pub async fn get_all_stats(&self) -> HashMap<String, PoolStats> {
        let pools = self.pools.lock().await;
        let mut out = HashMap::with_capacity(pools.len());
        for (id, pool) in pools.iter() {
            out.insert(id.clone(), pool.stats().await);
        }
        out
    }

    pub async fn clear_all(&self, dispose_idle: bool) {
        let pools: Vec<Arc<SessionPool>> = self.pools.lock().await.values().cloned().collect();
        for pool in pools {
            pool.clear(dispose_idle).await;
        }
    }

    pub async fn dispose(&self) {
        let pools: Vec<Arc<SessionPool>> = self.pools.lock().await.drain().map(|(_, p)| p).collect();
        for pool in pools {
            pool.dispose().await;
        }
    }

    pub async fn warmup_all(&self, config: Option<SessionConfig>) -> Result<(), PoolError> {
        let pools: Vec<Arc<SessionPool>> = self.pools.lock().await.values().cloned().collect();
        for pool in pools {
            pool.warmup(config.clone()).await?;
        }
        Ok(())
    }
}
