// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

use crate::task::TaskKind;

/// Static capability descriptor a backend advertises.
///
/// Mirrors the shape of `sven_model::registry::DriverMeta` — a plain,
/// serializable struct a registry can list without constructing anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineCapabilities {
    pub supported_kinds: Vec<TaskKind>,
    pub streaming: bool,
    pub concurrent_sessions: bool,
    pub task_abort: bool,
    /// 0 means unlimited.
    pub max_concurrent_sessions: u32,
    pub description: String,
    pub version: String,
}

impl EngineCapabilities {
    pub fn supports(&self, kind: &TaskKind) -> bool {
        self.supported_kinds.contains(kind)
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_concurrent_sessions == 0
    }
}
