// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use switchyard_types::{Event, SessionEndReason, ToolCallRef, ToolCallStatus};

/// In-flight tool call tracked between a `tool_use`/`tool_call_start` and its
/// matching `tool_result`/`tool_call_end`.
#[derive(Debug, Clone)]
pub struct ActiveToolCall {
    pub id: String,
    pub tool: String,
    pub status: ToolCallStatus,
}

fn progress_label(subtype: &str) -> &str {
    match subtype {
        "init" => "initializing",
        "reading" => "reading files",
        "writing" => "writing files",
        "thinking" => "thinking",
        "searching" => "searching",
        other => other,
    }
}

/// Incremental line-buffered parser (C3). Feed it raw chunks as they arrive
/// from a backend process/HTTP stream/library call; it accumulates a
/// possibly-partial trailing line and only parses complete ones.
#[derive(Debug, Default)]
pub struct StreamParser {
    session_id: Option<String>,
    accumulated_text: String,
    active_tool_calls: HashMap<String, ActiveToolCall>,
    line_buffer: String,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn active_tool_calls(&self) -> &HashMap<String, ActiveToolCall> {
        &self.active_tool_calls
    }

    /// Clears all parser state. Does not affect anything already returned.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.accumulated_text.clear();
        self.active_tool_calls.clear();
        self.line_buffer.clear();
    }

    /// Appends `chunk` to the line buffer, parses every complete line it
    /// now contains, and leaves a trailing partial line (if any) buffered
    /// for the next call.
    pub fn feed(&mut self, chunk: &str) -> Vec<Event> {
        self.line_buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(idx) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer.drain(..=idx).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            events.extend(self.parse_line(line));
        }
        events
    }

    /// Flushes any remaining buffered partial line as if it were terminated,
    /// for callers that know the stream has ended without a trailing
    /// newline.
    pub fn flush(&mut self) -> Vec<Event> {
        if self.line_buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.line_buffer);
        self.parse_line(&line)
    }

    /// Parses a single complete line: JSON dispatch on success, plain-text
    /// heuristics on failure.
    pub fn parse_line(&mut self, line: &str) -> Vec<Event> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => self.dispatch_json(&value),
            Err(_) => self.parse_plain_text(trimmed),
        }
    }

    fn dispatch_json(&mut self, value: &Value) -> Vec<Event> {
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            debug!("json line has no type field; ignoring");
            return Vec::new();
        };
        match kind {
            "system" => self.dispatch_system(value),
            "assistant" => self.dispatch_assistant(value),
            "user" => self.dispatch_user(value),
            "text_delta" => self.dispatch_text_delta(value),
            "tool_start" => self.dispatch_tool_start(value),
            "tool_end" => self.dispatch_tool_end(value),
            "permission_request" => vec![Event::progress("awaiting permission")],
            "error" => vec![Event::error(
                value
                    .get("message")
                    .or_else(|| value.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            )],
            "session_end" => self.dispatch_session_end(),
            other => {
                warn!(kind = other, "unrecognized stream event type; ignoring");
                Vec::new()
            }
        }
    }

    fn dispatch_system(&mut self, value: &Value) -> Vec<Event> {
        let mut events = Vec::new();

        if let Some(session_id) = value.get("session_id").and_then(Value::as_str) {
            self.session_id = Some(session_id.to_string());
            events.push(Event::SessionStart {
                session_id: session_id.to_string(),
            });
        }

        let extra = value.get("extra");
        let subtype = value.get("subtype").and_then(Value::as_str);
        let extra_message = extra.and_then(|e| e.get("message")).and_then(Value::as_str);
        let extra_session = extra.and_then(|e| e.get("session_id")).and_then(Value::as_str);

        if let Some(session_id) = extra_session {
            if self.session_id.is_none() {
                self.session_id = Some(session_id.to_string());
            }
        }

        if let Some(subtype) = subtype {
            events.push(Event::progress(progress_label(subtype)));
        } else if let Some(message) = extra_message {
            events.push(Event::progress(message));
        }

        events
    }

    fn dispatch_assistant(&mut self, value: &Value) -> Vec<Event> {
        let mut events = Vec::new();
        let mut text = String::new();
        let mut tool_calls: Vec<ToolCallRef> = Vec::new();

        let content = value
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for child in &content {
            match child.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(fragment) = child.get("text").and_then(Value::as_str) {
                        text.push_str(fragment);
                    }
                }
                Some("tool_use") => {
                    let id = child
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let name = child
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let args = child.get("input").cloned().unwrap_or(Value::Null);

                    self.active_tool_calls.insert(
                        id.clone(),
                        ActiveToolCall {
                            id: id.clone(),
                            tool: name.clone(),
                            status: ToolCallStatus::Pending,
                        },
                    );
                    tool_calls.push(ToolCallRef {
                        id: id.clone(),
                        name: name.clone(),
                        status: ToolCallStatus::Pending,
                    });
                    events.push(Event::ToolCallStart {
                        call_id: id,
                        tool: name,
                        args,
                    });
                }
                _ => {}
            }
        }

        if !text.is_empty() {
            self.accumulated_text.push_str(&text);
        }

        if !text.is_empty() || !tool_calls.is_empty() {
            events.push(Event::AssistantMessage {
                content: text,
                is_delta: false,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
            });
        }

        events
    }

    fn dispatch_user(&mut self, value: &Value) -> Vec<Event> {
        let mut events = Vec::new();

        let content = value
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for child in &content {
            if child.get("type").and_then(Value::as_str) != Some("tool_result") {
                continue;
            }
            let Some(call_id) = child.get("tool_use_id").and_then(Value::as_str) else {
                continue;
            };
            let is_error = child
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let result = child.get("content").cloned().unwrap_or(Value::Null);

            let tool_name = self
                .active_tool_calls
                .get(call_id)
                .map(|t| t.tool.clone())
                .unwrap_or_default();

            if let Some(active) = self.active_tool_calls.get_mut(call_id) {
                active.status = if is_error {
                    ToolCallStatus::Failed
                } else {
                    ToolCallStatus::Completed
                };
            }

            events.push(Event::ToolCallEnd {
                call_id: call_id.to_string(),
                tool: tool_name,
                result,
                success: !is_error,
            });
        }

        events
    }

    fn dispatch_text_delta(&mut self, value: &Value) -> Vec<Event> {
        let delta = value
            .get("delta")
            .or_else(|| value.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.accumulated_text.push_str(&delta);
        vec![Event::AssistantMessage {
            content: delta,
            is_delta: true,
            tool_calls: None,
        }]
    }

    fn dispatch_tool_start(&mut self, value: &Value) -> Vec<Event> {
        let id = value
            .get("call_id")
            .or_else(|| value.get("id"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let name = value
            .get("tool")
            .or_else(|| value.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let args = value.get("args").or_else(|| value.get("input")).cloned().unwrap_or(Value::Null);

        self.active_tool_calls.insert(
            id.clone(),
            ActiveToolCall {
                id: id.clone(),
                tool: name.clone(),
                status: ToolCallStatus::Pending,
            },
        );

        vec![
            Event::progress(format!("running {name}")),
            Event::ToolCallStart {
                call_id: id,
                tool: name,
                args,
            },
        ]
    }

    fn dispatch_tool_end(&mut self, value: &Value) -> Vec<Event> {
        let id = value
            .get("call_id")
            .or_else(|| value.get("id"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let success = value.get("success").and_then(Value::as_bool).unwrap_or(true);
        let result = value.get("result").cloned().unwrap_or(Value::Null);

        let tool_name = self
            .active_tool_calls
            .get(&id)
            .map(|t| t.tool.clone())
            .unwrap_or_default();

        if let Some(active) = self.active_tool_calls.get_mut(&id) {
            active.status = if success {
                ToolCallStatus::Completed
            } else {
                ToolCallStatus::Failed
            };
        }

        vec![
            Event::progress(format!("finished {tool_name}")),
            Event::ToolCallEnd {
                call_id: id,
                tool: tool_name,
                result,
                success,
            },
        ]
    }

    fn dispatch_session_end(&mut self) -> Vec<Event> {
        let session_id = self.session_id.clone().unwrap_or_default();
        let events = vec![Event::SessionEnd {
            session_id,
            reason: SessionEndReason::Completed,
        }];
        self.reset();
        events
    }

    fn parse_plain_text(&mut self, line: &str) -> Vec<Event> {
        if let Some(tool) = line.strip_prefix("Calling tool: ") {
            let tool = tool.trim().to_string();
            let id = format!("plain-{}", self.active_tool_calls.len());
            self.active_tool_calls.insert(
                id.clone(),
                ActiveToolCall {
                    id: id.clone(),
                    tool: tool.clone(),
                    status: ToolCallStatus::Pending,
                },
            );
            return vec![
                Event::progress(format!("running {tool}")),
                Event::ToolCallStart {
                    call_id: id,
                    tool,
                    args: Value::Null,
                },
            ];
        }

        if let Some(message) = line.strip_prefix("Error:") {
            return vec![Event::error(message.trim().to_string())];
        }

        self.accumulated_text.push_str(line);
        vec![Event::Token {
            text: line.to_string(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(json: &str) -> String {
        format!("{json}\n")
    }

    #[test]
    fn feed_buffers_partial_trailing_line() {
        let mut parser = StreamParser::new();
        let events = parser.feed(r#"{"type":"system","session_id":"s1"}"#);
        assert!(events.is_empty(), "no newline yet, nothing should parse");

        let events = parser.feed("\n");
        assert_eq!(events.len(), 1);
        matches!(events[0], Event::SessionStart { .. });
        assert_eq!(parser.session_id(), Some("s1"));
    }

    #[test]
    fn feed_splits_multiple_lines_in_one_chunk() {
        let mut parser = StreamParser::new();
        let chunk = format!(
            "{}{}",
            line(r#"{"type":"system","session_id":"s1"}"#),
            "Calling tool: grep\n"
        );
        let events = parser.feed(&chunk);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn system_with_subtype_maps_to_human_readable_progress() {
        let mut parser = StreamParser::new();
        let events = parser.parse_line(r#"{"type":"system","subtype":"thinking"}"#);
        match &events[0] {
            Event::Progress { message, .. } => assert_eq!(message.as_deref(), Some("thinking")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn assistant_text_and_tool_use_emit_tool_call_start_then_assistant_message() {
        let mut parser = StreamParser::new();
        let json = r#"{
            "type": "assistant",
            "message": {
                "content": [
                    {"type": "text", "text": "Let me check that file."},
                    {"type": "tool_use", "id": "t1", "name": "read_file", "input": {"path": "a.rs"}}
                ]
            }
        }"#;
        let events = parser.parse_line(json);
        assert_eq!(events.len(), 2);
        match &events[0] {
            Event::ToolCallStart { call_id, tool, .. } => {
                assert_eq!(call_id, "t1");
                assert_eq!(tool, "read_file");
            }
            other => panic!("unexpected: {other:?}"),
        }
        match &events[1] {
            Event::AssistantMessage { content, is_delta, tool_calls } => {
                assert_eq!(content, "Let me check that file.");
                assert!(!is_delta);
                assert_eq!(tool_calls.as_ref().unwrap().len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(parser.active_tool_calls().contains_key("t1"));
    }

    #[test]
    fn user_tool_result_closes_the_matching_tool_call() {
        let mut parser = StreamParser::new();
        parser.parse_line(
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"read_file","input":{}}]}}"#,
        );
        let events = parser.parse_line(
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"ok","is_error":false}]}}"#,
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::ToolCallEnd { call_id, tool, success, .. } => {
                assert_eq!(call_id, "t1");
                assert_eq!(tool, "read_file");
                assert!(success);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn text_delta_accumulates_and_marks_is_delta() {
        let mut parser = StreamParser::new();
        parser.parse_line(r#"{"type":"text_delta","delta":"Hel"}"#);
        parser.parse_line(r#"{"type":"text_delta","delta":"lo"}"#);
        assert_eq!(parser.accumulated_text(), "Hello");
    }

    #[test]
    fn session_end_resets_all_state() {
        let mut parser = StreamParser::new();
        parser.parse_line(r#"{"type":"system","session_id":"s1"}"#);
        parser.parse_line(r#"{"type":"text_delta","delta":"hi"}"#);
        let events = parser.parse_line(r#"{"type":"session_end"}"#);
        match &events[0] {
            Event::SessionEnd { session_id, reason } => {
                assert_eq!(session_id, "s1");
                assert_eq!(*reason, SessionEndReason::Completed);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(parser.session_id().is_none());
        assert!(parser.accumulated_text().is_empty());
    }

    #[test]
    fn plain_text_calling_tool_pattern_emits_progress_and_tool_start() {
        let mut parser = StreamParser::new();
        let events = parser.parse_line("Calling tool: search_code");
        assert_eq!(events.len(), 2);
        match &events[1] {
            Event::ToolCallStart { tool, .. } => assert_eq!(tool, "search_code"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn plain_text_error_pattern_emits_error_event() {
        let mut parser = StreamParser::new();
        let events = parser.parse_line("Error: disk full");
        match &events[0] {
            Event::Error { error, .. } => assert_eq!(error, "disk full"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn plain_text_otherwise_emits_a_single_token() {
        let mut parser = StreamParser::new();
        let events = parser.parse_line("just some narration");
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Token { text } => assert_eq!(text, "just some narration"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_json_type_is_ignored() {
        let mut parser = StreamParser::new();
        let events = parser.parse_line(r#"{"type":"totally_unknown"}"#);
        assert!(events.is_empty());
    }

    #[test]
    fn permission_request_emits_single_progress() {
        let mut parser = StreamParser::new();
        let events = parser.parse_line(r#"{"type":"permission_request"}"#);
        assert_eq!(events.len(), 1);
        matches!(events[0], Event::Progress { .. });
    }
}
