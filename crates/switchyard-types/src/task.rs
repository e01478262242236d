// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Intent of a unit of work submitted to the core.
///
/// Kept open via [`TaskKind::Other`] rather than a closed enum — a new
/// backend capability should never force a breaking change here, mirroring
/// how `sven_config::AgentMode` leaves room to grow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Chat,
    Refactor,
    Analyze,
    Generate,
    Other(String),
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            TaskKind::Chat => "chat",
            TaskKind::Refactor => "refactor",
            TaskKind::Analyze => "analyze",
            TaskKind::Generate => "generate",
            TaskKind::Other(s) => s,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        match s {
            "chat" => TaskKind::Chat,
            "refactor" => TaskKind::Refactor,
            "analyze" => TaskKind::Analyze,
            "generate" => TaskKind::Generate,
            other => TaskKind::Other(other.to_string()),
        }
    }
}

impl Serialize for TaskKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(TaskKind::from(s.as_str()))
    }
}

/// The prompt, attached files, and open-ended extras for a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInput {
    pub prompt: String,
    #[serde(default)]
    pub files: Vec<String>,
    /// Open map of backend-specific parameters the core does not interpret.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            files: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }
}

/// A unit of work submitted to the core.
///
/// `id` is immutable once constructed and must be unique for the lifetime of
/// the [`crate::TaskManager`]/[`crate::TaskQueue`] it is submitted to — the
/// core does not deduplicate or retry submission for the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub input: TaskInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_id: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, kind: TaskKind, input: TaskInput) -> Self {
        Self {
            id: id.into(),
            kind,
            input,
            engine_id: None,
        }
    }

    pub fn with_engine(mut self, engine_id: impl Into<String>) -> Self {
        self.engine_id = Some(engine_id.into());
        self
    }
}
