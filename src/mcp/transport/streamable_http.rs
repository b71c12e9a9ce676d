//! Streamable HTTP transport.
//!
//! Every client message is an HTTP POST to the endpoint. The server answers
//! with either a JSON body or an event stream whose `data:` lines carry
//! JSON-RPC messages; the first response/error line ends the exchange. The
//! session id handed out on `initialize` travels back in `mcp-session-id`,
//! and the session is released with a DELETE carrying that header.

use async_trait::async_trait;
use futures_util::StreamExt;
use rust_mcp_schema::schema_utils::ClientMessage;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::McpTransport;
use crate::mcp::error::{McpError, Result};

pub(crate) const MCP_JSON_CONTENT_TYPE: &str = "application/json";
pub(crate) const MCP_JSON_AND_SSE_ACCEPT: &str = "application/json, text/event-stream";
pub(crate) const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
pub(crate) const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
const MCP_HTTP_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const MCP_HTTP_REQUEST_TIMEOUT_SECONDS: u64 = 60;
const MCP_HTTP_POOL_IDLE_TIMEOUT_SECONDS: u64 = 90;
const MCP_HTTP_POOL_MAX_IDLE_PER_HOST: usize = 8;

/// Configuration for the streamable HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub url: String,
    /// Full `Authorization` header value, e.g. `Bearer <token>`.
    pub auth_header: Option<String>,
}

impl HttpTransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_header: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl AsRef<str>) -> Self {
        self.auth_header = Some(format!("Bearer {}", token.as_ref()));
        self
    }
}

pub struct StreamableHttpTransport {
    config: HttpTransportConfig,
    client: Option<reqwest::Client>,
    session_id: Option<String>,
    protocol_version: Option<String>,
}

impl StreamableHttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        Self {
            config,
            client: None,
            session_id: None,
            protocol_version: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn client(&self) -> Result<&reqwest::Client> {
        self.client.as_ref().ok_or(McpError::NotConnected)
    }

    fn apply_session_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = apply_protocol_version_header(request, self.protocol_version.as_deref());
        if let Some(auth) = self.config.auth_header.as_deref() {
            request = request.header("Authorization", auth);
        }
        if let Some(session_id) = self.session_id.as_deref() {
            request = request.header(MCP_SESSION_ID_HEADER, session_id);
        }
        request
    }

    async fn post(&mut self, message: &ClientMessage) -> Result<reqwest::Response> {
        let payload =
            serde_json::to_string(message).map_err(|err| McpError::protocol(err.to_string()))?;
        let request =
            apply_client_post_headers(self.client()?.post(&self.config.url)).body(payload);
        let request = self.apply_session_headers(request);

        debug!(url = %self.config.url, "Sending MCP HTTP request");
        let response = request
            .send()
            .await
            .map_err(|err| McpError::transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::transport(format!("HTTP error: {}", response.status())));
        }

        if let Some(session_id) = header_value(&response, MCP_SESSION_ID_HEADER) {
            self.session_id = Some(session_id);
        }
        Ok(response)
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    async fn open_stream(&mut self) -> Result<()> {
        reqwest::Url::parse(&self.config.url).map_err(|err| {
            McpError::connection(format!("invalid MCP URL {}: {err}", self.config.url))
        })?;
        let client = build_mcp_http_client()
            .map_err(|err| McpError::connection(format!("failed to build HTTP client: {err}")))?;
        self.client = Some(client);
        info!(url = %self.config.url, "Opened MCP HTTP stream");
        Ok(())
    }

    async fn send_request(&mut self, message: ClientMessage) -> Result<Value> {
        let response = self.post(&message).await?;
        let content_type = header_value(&response, reqwest::header::CONTENT_TYPE.as_str())
            .unwrap_or_default();

        if is_event_stream_content_type(&content_type) {
            next_sse_response(response).await
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|err| McpError::transport(err.to_string()))?;
            serde_json::from_slice::<Value>(&body)
                .map_err(|err| McpError::protocol(format!("invalid JSON-RPC response: {err}")))
        }
    }

    async fn send_notification(&mut self, message: ClientMessage) -> Result<()> {
        self.post(&message).await.map(|_| ())
    }

    fn set_protocol_version(&mut self, version: &str) {
        self.protocol_version = Some(version.to_string());
    }

    async fn end_session(&mut self) -> Result<()> {
        let Some(session_id) = self.session_id.clone() else {
            return Ok(());
        };
        let request = self.apply_session_headers(self.client()?.delete(&self.config.url));
        self.session_id = None;

        let response = request
            .send()
            .await
            .map_err(|err| McpError::transport(err.to_string()))?;
        let status = response.status();
        // 405 means the server does not let clients end sessions explicitly.
        if status.is_success() || status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            debug!(session_id = %session_id, status = %status, "Ended MCP session");
            Ok(())
        } else {
            Err(McpError::transport(format!("HTTP error: {status}")))
        }
    }

    async fn close_stream(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            debug!(url = %self.config.url, "Closed MCP HTTP stream");
        }
        self.protocol_version = None;
        Ok(())
    }
}

fn build_mcp_http_client() -> std::result::Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(MCP_HTTP_CONNECT_TIMEOUT_SECONDS))
        .timeout(Duration::from_secs(MCP_HTTP_REQUEST_TIMEOUT_SECONDS))
        .pool_idle_timeout(Duration::from_secs(MCP_HTTP_POOL_IDLE_TIMEOUT_SECONDS))
        .pool_max_idle_per_host(MCP_HTTP_POOL_MAX_IDLE_PER_HOST)
        .build()
        .map_err(|err| err.to_string())
}

pub(crate) fn apply_client_post_headers(
    request: reqwest::RequestBuilder,
) -> reqwest::RequestBuilder {
    request
        .header("Content-Type", MCP_JSON_CONTENT_TYPE)
        .header("Accept", MCP_JSON_AND_SSE_ACCEPT)
}

pub(crate) fn apply_protocol_version_header(
    request: reqwest::RequestBuilder,
    protocol_version: Option<&str>,
) -> reqwest::RequestBuilder {
    match protocol_version {
        Some(protocol_version) if !protocol_version.trim().is_empty() => {
            request.header(MCP_PROTOCOL_VERSION_HEADER, protocol_version)
        }
        _ => request,
    }
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

#[derive(Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut search_index = 0;

        while let Some(relative_pos) = self.buffer[search_index..].iter().position(|b| *b == b'\n')
        {
            let newline_index = search_index + relative_pos;
            let mut line_end = newline_index;
            if line_end > search_index && self.buffer[line_end - 1] == b'\r' {
                line_end -= 1;
            }

            if let Ok(text) = std::str::from_utf8(&self.buffer[search_index..line_end]) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }

            search_index = newline_index + 1;
        }

        if flush {
            if let Ok(text) = std::str::from_utf8(&self.buffer[search_index..]) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
            self.buffer.clear();
        } else if search_index > 0 {
            self.buffer.drain(..search_index);
        }

        lines
    }
}

pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}

pub fn sse_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// True for JSON-RPC responses and errors, false for server requests and
/// notifications that may precede them on an event stream.
pub(crate) fn is_response_message(message: &Value) -> bool {
    message.get("method").is_none()
        && (message.get("result").is_some() || message.get("error").is_some())
}

async fn next_sse_response(response: reqwest::Response) -> Result<Value> {
    let mut stream = response.bytes_stream();
    let mut buffer = SseLineBuffer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| McpError::transport(err.to_string()))?;
        for line in buffer.push(&chunk) {
            if let Some(message) = take_response(&line)? {
                return Ok(message);
            }
        }
    }

    for line in buffer.finish() {
        if let Some(message) = take_response(&line)? {
            return Ok(message);
        }
    }

    Err(McpError::protocol("empty event-stream response"))
}

fn take_response(line: &str) -> Result<Option<Value>> {
    let Some(message) = decode_sse_line(line)? else {
        return Ok(None);
    };
    if is_response_message(&message) {
        return Ok(Some(message));
    }
    debug!(method = ?message.get("method"), "Skipping server-initiated MCP message");
    Ok(None)
}

fn decode_sse_line(line: &str) -> Result<Option<Value>> {
    let Some(payload) = sse_data_payload(line) else {
        return Ok(None);
    };

    if payload.is_empty() {
        return Ok(None);
    }

    serde_json::from_str::<Value>(payload)
        .map(Some)
        .map_err(|err| McpError::protocol(format!("invalid event-stream payload: {err}")))
}
