//! Streaming client for OpenAI-compatible `chat/completions`.
//!
//! The orchestrator talks to [`CompletionService`]; [`ChatCompletionClient`]
//! is the HTTP implementation. Responses are always requested as a stream and
//! folded back into one [`Message`], including any tool-call deltas.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use memchr::memchr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatResponse, ChatToolCallDelta, ToolDescriptor};
use crate::core::config::CompletionSettings;
use crate::core::message::{Message, ToolCall};
use crate::utils::auth::add_auth_headers;
use crate::utils::url::chat_completions_url;

const COMPLETION_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const COMPLETION_REQUEST_TIMEOUT_SECONDS: u64 = 300;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(String),

    /// Error reported by the API, already formatted for display.
    #[error("{0}")]
    Api(String),
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the next assistant message for `history`, offering `tools`.
    async fn get_completion(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Message, CompletionError>;
}

pub struct ChatCompletionClient {
    http: reqwest::Client,
    settings: CompletionSettings,
}

impl ChatCompletionClient {
    pub fn new(settings: CompletionSettings) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(COMPLETION_CONNECT_TIMEOUT_SECONDS))
            .timeout(Duration::from_secs(COMPLETION_REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(|err| CompletionError::Request(err.to_string()))?;
        Ok(Self { http, settings })
    }

    pub fn endpoint(&self) -> String {
        chat_completions_url(
            &self.settings.base_url,
            self.settings.flavor,
            &self.settings.model,
            self.settings.api_version.as_deref(),
        )
    }
}

#[async_trait]
impl CompletionService for ChatCompletionClient {
    async fn get_completion(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Message, CompletionError> {
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: history.iter().map(Message::to_api).collect(),
            stream: true,
            tools: (!tools.is_empty()).then(|| tools.to_vec()),
        };

        let url = self.endpoint();
        debug!(url = %url, messages = history.len(), tools = tools.len(), "Requesting completion");
        let http_request = add_auth_headers(
            self.http.post(url).header("Content-Type", "application/json"),
            self.settings.flavor,
            &self.settings.api_key,
        );
        let response = http_request
            .json(&request)
            .send()
            .await
            .map_err(|err| CompletionError::Request(err.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(CompletionError::Api(format_api_error(&error_text)));
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut accumulator = CompletionAccumulator::default();

        'stream: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| CompletionError::Request(err.to_string()))?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = memchr(b'\n', &buffer) {
                let finished = match std::str::from_utf8(&buffer[..newline_pos]) {
                    Ok(line) => accumulator.process_line(line.trim())?,
                    Err(err) => {
                        warn!(error = %err, "Invalid UTF-8 in completion stream");
                        false
                    }
                };
                buffer.drain(..=newline_pos);
                if finished {
                    break 'stream;
                }
            }
        }

        if !accumulator.done && !buffer.is_empty() {
            if let Ok(line) = std::str::from_utf8(&buffer) {
                accumulator.process_line(line.trim())?;
            }
        }

        Ok(accumulator.finish())
    }
}

#[derive(Default)]
struct PartialToolCall {
    /// `index` the stream used for this call, when it sent one.
    stream_index: Option<u32>,
    id: String,
    name: String,
    arguments: String,
}

/// Folds stream events into one assistant message.
#[derive(Default)]
struct CompletionAccumulator {
    content: String,
    tool_calls: Vec<PartialToolCall>,
    done: bool,
}

impl CompletionAccumulator {
    /// Returns true once the stream signalled completion.
    fn process_line(&mut self, line: &str) -> Result<bool, CompletionError> {
        match extract_data_payload(line) {
            Some(payload) => self.apply_payload(payload),
            None => Ok(false),
        }
    }

    fn apply_payload(&mut self, payload: &str) -> Result<bool, CompletionError> {
        if payload == "[DONE]" {
            self.done = true;
            return Ok(true);
        }
        if payload.trim().is_empty() {
            return Ok(false);
        }

        let response = serde_json::from_str::<ChatResponse>(payload)
            .map_err(|_| CompletionError::Api(format_api_error(payload)))?;
        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.delta.content {
                self.content.push_str(&content);
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                self.apply_tool_delta(delta);
            }
            if let Some(reason) = choice.finish_reason {
                debug!(finish_reason = %reason, "Completion finished");
            }
        }
        Ok(false)
    }

    fn apply_tool_delta(&mut self, delta: ChatToolCallDelta) {
        let index = self.slot_for(&delta);
        let call = &mut self.tool_calls[index];
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            call.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                call.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    /// Finds the call a delta continues, or starts a new one. Stream indices
    /// are matched, never used as positions.
    fn slot_for(&mut self, delta: &ChatToolCallDelta) -> usize {
        let existing = match (delta.index, delta.id.as_deref()) {
            (Some(index), _) => self
                .tool_calls
                .iter()
                .position(|call| call.stream_index == Some(index)),
            (None, Some(id)) => self.tool_calls.iter().position(|call| call.id == id),
            (None, None) => self.tool_calls.len().checked_sub(1),
        };
        existing.unwrap_or_else(|| {
            self.tool_calls.push(PartialToolCall {
                stream_index: delta.index,
                ..PartialToolCall::default()
            });
            self.tool_calls.len() - 1
        })
    }

    fn finish(self) -> Message {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .filter(|call| !call.name.is_empty())
            .enumerate()
            .map(|(index, call)| {
                let id = if call.id.is_empty() {
                    format!("call_{index}")
                } else {
                    call.id
                };
                ToolCall::new(id, call.name, call.arguments)
            })
            .collect();
        Message::assistant_with_tool_calls(self.content, tool_calls)
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error: <empty response>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
            return format!("API Error: {summary}");
        }
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            return format!("API Error:\n{pretty_json}");
        }
    }

    format!("API Error: {trimmed}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(accumulator: &mut CompletionAccumulator, lines: &[&str]) -> bool {
        let mut finished = false;
        for line in lines {
            finished = accumulator.process_line(line).expect("line should parse");
        }
        finished
    }

    #[test]
    fn accumulates_content_across_spacing_variants() {
        let mut accumulator = CompletionAccumulator::default();
        let finished = feed(
            &mut accumulator,
            &[
                r#"data: {"choices":[{"delta":{"role":"assistant","content":"Hello"}}]}"#,
                "",
                r#"data:{"choices":[{"delta":{"content":", world"}}]}"#,
                ": keep-alive",
                "data:[DONE]",
            ],
        );

        assert!(finished);
        let message = accumulator.finish();
        assert_eq!(message, Message::assistant("Hello, world"));
    }

    #[test]
    fn assembles_fragmented_tool_calls() {
        let mut accumulator = CompletionAccumulator::default();
        feed(
            &mut accumulator,
            &[
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","type":"function","function":{"name":"get_user","arguments":""}}]}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"id\":"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"7\"}"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"search_user","arguments":"{}"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
                "data: [DONE]",
            ],
        );

        let message = accumulator.finish();
        assert!(message.content.is_empty());
        assert_eq!(
            message.tool_calls,
            vec![
                ToolCall::new("call_a", "get_user", r#"{"id":"7"}"#),
                ToolCall::new("call_b", "search_user", "{}"),
            ]
        );
    }

    #[test]
    fn tool_call_without_id_gets_positional_id() {
        let mut accumulator = CompletionAccumulator::default();
        feed(
            &mut accumulator,
            &[r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"ping","arguments":""}}]}}]}"#],
        );
        let message = accumulator.finish();
        assert_eq!(message.tool_calls[0].id, "call_0");
    }

    #[test]
    fn sparse_and_huge_tool_indices_start_new_calls() {
        let mut accumulator = CompletionAccumulator::default();
        feed(
            &mut accumulator,
            &[
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":4294967295,"id":"call_x","function":{"name":"get_user","arguments":"{\"id\":"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":7,"id":"call_y","function":{"name":"ping","arguments":"{}"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":4294967295,"function":{"arguments":"\"7\"}"}}]}}]}"#,
            ],
        );

        assert_eq!(accumulator.tool_calls.len(), 2);
        let message = accumulator.finish();
        assert_eq!(
            message.tool_calls,
            vec![
                ToolCall::new("call_x", "get_user", r#"{"id":"7"}"#),
                ToolCall::new("call_y", "ping", "{}"),
            ]
        );
    }

    #[test]
    fn stream_error_payload_becomes_api_error() {
        let mut accumulator = CompletionAccumulator::default();
        let err = accumulator
            .process_line(r#"data: {"error":{"message":"internal server error"}}"#)
            .expect_err("error payload");
        match err {
            CompletionError::Api(text) => assert_eq!(text, "API Error: internal server error"),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn format_api_error_prefers_summary() {
        let raw = r#"{"error":{"message":"model   overloaded","type":"invalid_request_error"}}"#;
        assert_eq!(format_api_error(raw), "API Error: model overloaded");
    }

    #[test]
    fn format_api_error_handles_json_without_summary_and_plaintext() {
        assert_eq!(
            format_api_error(r#"{"status":"failed"}"#),
            "API Error:\n{\n  \"status\": \"failed\"\n}"
        );
        assert_eq!(format_api_error("api failure"), "API Error: api failure");
        assert_eq!(format_api_error("  "), "API Error: <empty response>");
    }
}
