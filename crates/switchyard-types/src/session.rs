// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`crate::Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Disposed,
}

fn default_timeout_ms() -> u64 {
    300_000
}

/// Configuration a session is constructed with.
///
/// `options` is the open pass-through map from spec.md §9 ("Open map of
/// 'extra' options") — fields the core interprets (`workspace_dir`,
/// `verbose`, `timeout_ms`) get typed accessors; everything else rides
/// through untouched for the backend to interpret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub workspace_dir: Option<String>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workspace_dir: None,
            verbose: false,
            timeout_ms: default_timeout_ms(),
            options: serde_json::Map::new(),
        }
    }
}
