// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why a session stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    Completed,
    Aborted,
    Error,
}

/// Runtime status of a queued/running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Error,
    Canceled,
}

/// Status of a single tool call as tracked by the stream parser / assistant
/// message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Completed,
    Failed,
}

/// A tool call referenced from an `assistant_message` event's `tool_calls`
/// list — not the same as the standalone `tool_call_start`/`tool_call_end`
/// events, which carry the full arguments/result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub id: String,
    pub name: String,
    pub status: ToolCallStatus,
}

/// The normalized event vocabulary produced by every [`crate::Session`] and
/// fanned out by the [`crate::EventBus`].
///
/// Every variant serializes with a `type` discriminator (`#[serde(tag =
/// "type")]`), matching the wire shape spec'd in §3/§6: a JSON line with a
/// `type` field the [`crate::EventBus`]'s consumers and the
/// `switchyard-parser` crate both recognize by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Token {
        text: String,
    },
    AssistantMessage {
        content: String,
        is_delta: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCallRef>>,
    },
    UserMessage {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        files: Option<Vec<String>>,
    },
    ToolCallStart {
        call_id: String,
        tool: String,
        args: Value,
    },
    ToolCallEnd {
        call_id: String,
        tool: String,
        result: Value,
        success: bool,
    },
    Progress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent: Option<u8>,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    SessionStart {
        session_id: String,
    },
    SessionEnd {
        session_id: String,
        reason: SessionEndReason,
    },
    TaskMetadata {
        task_id: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_time: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_time: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    TaskProgress {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent: Option<u8>,
    },
    TaskCompleted {
        task_id: String,
        status: TaskStatus,
        duration_ms: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    TaskCanceled {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Result {
        output: Value,
    },
}

impl Event {
    /// The `type` discriminator this event carries on the wire — used by the
    /// event bus as the topic key.
    pub fn topic(&self) -> &'static str {
        match self {
            Event::Token { .. } => "token",
            Event::AssistantMessage { .. } => "assistant_message",
            Event::UserMessage { .. } => "user_message",
            Event::ToolCallStart { .. } => "tool_call_start",
            Event::ToolCallEnd { .. } => "tool_call_end",
            Event::Progress { .. } => "progress",
            Event::Error { .. } => "error",
            Event::SessionStart { .. } => "session_start",
            Event::SessionEnd { .. } => "session_end",
            Event::TaskMetadata { .. } => "task_metadata",
            Event::TaskProgress { .. } => "task_progress",
            Event::TaskCompleted { .. } => "task_completed",
            Event::TaskCanceled { .. } => "task_canceled",
            Event::Result { .. } => "result",
        }
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Event::Progress {
            message: Some(message.into()),
            percent: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            error: message.into(),
            code: None,
        }
    }
}

/// The wildcard topic every subscriber can opt into, in addition to a single
/// event type.
pub const WILDCARD_TOPIC: &str = "*";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_matches_serde_tag() {
        let e = Event::Token {
            text: "hi".to_string(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], e.topic());
    }

    #[test]
    fn session_end_roundtrip() {
        let e = Event::SessionEnd {
            session_id: "s1".to_string(),
            reason: SessionEndReason::Aborted,
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        match back {
            Event::SessionEnd { session_id, reason } => {
                assert_eq!(session_id, "s1");
                assert_eq!(reason, SessionEndReason::Aborted);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn progress_helper_sets_message_only() {
        let e = Event::progress("thinking");
        match e {
            Event::Progress { message, percent } => {
                assert_eq!(message.as_deref(), Some("thinking"));
                assert!(percent.is_none());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn all_topics_are_distinct() {
        let events = vec![
            Event::Token { text: String::new() },
            Event::AssistantMessage { content: String::new(), is_delta: false, tool_calls: None },
            Event::UserMessage { content: String::new(), files: None },
            Event::ToolCallStart { call_id: "c".into(), tool: "t".into(), args: Value::Null },
            Event::ToolCallEnd { call_id: "c".into(), tool: "t".into(), result: Value::Null, success: true },
            Event::Progress { message: None, percent: None },
            Event::Error { error: "e".into(), code: None },
            Event::SessionStart { session_id: "s".into() },
            Event::SessionEnd { session_id: "s".into(), reason: SessionEndReason::Completed },
            Event::TaskMetadata { task_id: "t".into(), status: TaskStatus::Pending, start_time: None, end_time: None, duration_ms: None, error: None },
            Event::TaskProgress { task_id: "t".into(), message: None, percent: None },
            Event::TaskCompleted { task_id: "t".into(), status: TaskStatus::Success, duration_ms: 0, error: None },
            Event::TaskCanceled { task_id: "t".into(), reason: None },
            Event::Result { output: Value::Null },
        ];
        let mut topics: Vec<&str> = events.iter().map(|e| e.topic()).collect();
        let before = topics.len();
        topics.sort();
        topics.dedup();
        assert_eq!(topics.len(), before);
    }
}
