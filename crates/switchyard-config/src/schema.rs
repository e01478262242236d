// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use serde::{Deserialize, Serialize};

use switchyard_bus::EventBus;
use switchyard_pool::SessionPoolConfig;
use switchyard_queue::{ManagerConfig, TaskQueueConfig};

/// Root configuration covering every ambient subsystem: the event bus, the
/// session pool, and the task queue/manager. The engine registry itself has
/// no persistent configuration — engines are registered in code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Id of the engine used when a task does not name one explicitly.
    /// Left unset, the first engine registered with `as_default: true` wins.
    #[serde(default)]
    pub default_engine: Option<String>,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

fn default_bus_max_history() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Number of recent published events the bus retains for late subscribers
    /// and diagnostics (spec.md §4.2, "Event Bus").
    #[serde(default = "default_bus_max_history")]
    pub max_history: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_history: default_bus_max_history(),
        }
    }
}

impl BusConfig {
    pub fn build(&self) -> EventBus {
        EventBus::new(self.max_history)
    }
}

fn default_max_pool_size() -> usize {
    5
}
fn default_min_pool_size() -> usize {
    0
}
fn default_max_idle_time_secs() -> u64 {
    30 * 60
}
fn default_max_session_lifetime_secs() -> u64 {
    2 * 60 * 60
}

/// YAML-friendly mirror of [`switchyard_pool::SessionPoolConfig`].
///
/// `Duration` does not round-trip through YAML without a helper, so the
/// time-based fields are plain seconds here and converted with [`Self::build`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum sessions a single engine's pool holds, idle or in use.
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    /// Sessions kept warm even while idle.
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: usize,
    /// Idle sessions older than this are disposed on the next sweep.
    #[serde(default = "default_max_idle_time_secs")]
    pub max_idle_time_secs: u64,
    /// Sessions are disposed once they exceed this total lifetime, in use or not.
    #[serde(default = "default_max_session_lifetime_secs")]
    pub max_session_lifetime_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: default_max_pool_size(),
            min_pool_size: default_min_pool_size(),
            max_idle_time_secs: default_max_idle_time_secs(),
            max_session_lifetime_secs: default_max_session_lifetime_secs(),
        }
    }
}

impl PoolConfig {
    pub fn build(&self) -> SessionPoolConfig {
        SessionPoolConfig {
            max_pool_size: self.max_pool_size,
            min_pool_size: self.min_pool_size,
            max_idle_time: Duration::from_secs(self.max_idle_time_secs),
            max_session_lifetime: Duration::from_secs(self.max_session_lifetime_secs),
        }
    }
}

fn default_max_parallel() -> usize {
    1
}
fn default_timeout_ms() -> u64 {
    300_000
}
fn default_max_history() -> usize {
    200
}

/// YAML-friendly mirror of [`switchyard_queue::ManagerConfig`] (and, via
/// `max_parallel`, [`switchyard_queue::TaskQueueConfig`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Tasks run concurrently before admission blocks on a free slot.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Per-task timeout applied when a submission does not set its own.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Bound on the task manager's retained terminal-result history.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            default_timeout_ms: default_timeout_ms(),
            max_history: default_max_history(),
        }
    }
}

impl QueueConfig {
    pub fn build_queue(&self) -> TaskQueueConfig {
        TaskQueueConfig {
            max_parallel: self.max_parallel,
        }
    }

    pub fn build_manager(&self) -> ManagerConfig {
        ManagerConfig {
            max_parallel: self.max_parallel,
            default_timeout_ms: self.default_timeout_ms,
            max_history: self.max_history,
        }
    }
}
