//! Scripted stand-ins for the MCP transport and the completion service.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::ClientMessage;
use serde_json::{json, Value};

use crate::api::ToolDescriptor;
use crate::core::chat_stream::{CompletionError, CompletionService};
use crate::core::message::Message;
use crate::mcp::error::{McpError, Result};
use crate::mcp::transport::{McpTransport, MCP_METHOD_NOT_FOUND};

/// What the scripted server does with one request.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Result(Value),
    RpcError { code: i64, message: String },
    Transport(String),
}

/// Everything the scripted transport saw, shared with the test body.
#[derive(Debug, Default)]
pub struct TransportLog {
    /// `open_stream`, `request:<method>`, `notify:<method>`, `end_session`,
    /// `close_stream`, in call order.
    pub events: Vec<String>,
    /// Raw JSON of every request, in call order.
    pub requests: Vec<Value>,
    /// Last value passed to `set_protocol_version`.
    pub protocol_version: Option<String>,
}

impl TransportLog {
    pub fn count(&self, event: &str) -> usize {
        self.events.iter().filter(|seen| *seen == event).count()
    }

    /// Params of every request sent for `method`.
    pub fn params_for(&self, method: &str) -> Vec<Value> {
        self.requests
            .iter()
            .filter(|request| request.get("method").and_then(Value::as_str) == Some(method))
            .map(|request| request.get("params").cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// In-memory transport answering from per-method reply queues.
///
/// `initialize` is answered automatically with the configured capabilities,
/// echoing the requested protocol version. Methods with no queued reply get
/// JSON-RPC "method not found".
pub struct ScriptedTransport {
    log: Arc<Mutex<TransportLog>>,
    capabilities: Value,
    replies: HashMap<String, VecDeque<ScriptedReply>>,
    fail_open: bool,
    fail_initialize: bool,
    fail_end_session: bool,
    fail_close_stream: bool,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(TransportLog::default())),
            capabilities: json!({"tools": {}, "resources": {}, "prompts": {}}),
            replies: HashMap::new(),
            fail_open: false,
            fail_initialize: false,
            fail_end_session: false,
            fail_close_stream: false,
        }
    }

    pub fn log(&self) -> Arc<Mutex<TransportLog>> {
        Arc::clone(&self.log)
    }

    pub fn with_capabilities(mut self, capabilities: Value) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn reply(self, method: &str, result: Value) -> Self {
        self.push(method, ScriptedReply::Result(result))
    }

    pub fn reply_error(self, method: &str, code: i64, message: &str) -> Self {
        self.push(
            method,
            ScriptedReply::RpcError {
                code,
                message: message.to_string(),
            },
        )
    }

    pub fn fail_transport(self, method: &str, message: &str) -> Self {
        self.push(method, ScriptedReply::Transport(message.to_string()))
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn failing_end_session(mut self) -> Self {
        self.fail_end_session = true;
        self
    }

    pub fn failing_close_stream(mut self) -> Self {
        self.fail_close_stream = true;
        self
    }

    pub fn boxed(self) -> Box<dyn McpTransport> {
        Box::new(self)
    }

    fn push(mut self, method: &str, reply: ScriptedReply) -> Self {
        self.replies
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn record(&self, event: String) {
        if let Ok(mut log) = self.log.lock() {
            log.events.push(event);
        }
    }

    fn initialize_reply(&self, params: &Value) -> ScriptedReply {
        if self.fail_initialize {
            return ScriptedReply::Transport("HTTP error: 503 Service Unavailable".to_string());
        }
        let version = params
            .get("protocolVersion")
            .cloned()
            .unwrap_or_else(|| json!("2025-06-18"));
        ScriptedReply::Result(json!({
            "protocolVersion": version,
            "capabilities": self.capabilities,
            "serverInfo": {"name": "scripted", "version": "0.1.0", "icons": []}
        }))
    }
}

fn message_json(message: &ClientMessage) -> Result<Value> {
    serde_json::to_value(message).map_err(|err| McpError::protocol(err.to_string()))
}

fn method_of(message: &Value) -> String {
    message
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl McpTransport for ScriptedTransport {
    async fn open_stream(&mut self) -> Result<()> {
        self.record("open_stream".to_string());
        if self.fail_open {
            return Err(McpError::transport("connection refused"));
        }
        Ok(())
    }

    async fn send_request(&mut self, message: ClientMessage) -> Result<Value> {
        let message = message_json(&message)?;
        let method = method_of(&message);
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        self.record(format!("request:{method}"));
        if let Ok(mut log) = self.log.lock() {
            log.requests.push(message);
        }

        let reply = if method == "initialize" {
            self.initialize_reply(&params)
        } else {
            self.replies
                .get_mut(&method)
                .and_then(VecDeque::pop_front)
                .unwrap_or(ScriptedReply::RpcError {
                    code: MCP_METHOD_NOT_FOUND,
                    message: "Method not found".to_string(),
                })
        };

        match reply {
            ScriptedReply::Result(result) => {
                Ok(json!({"jsonrpc": "2.0", "id": id, "result": result}))
            }
            ScriptedReply::RpcError { code, message } => Ok(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": code, "message": message}
            })),
            ScriptedReply::Transport(message) => Err(McpError::Transport(message)),
        }
    }

    async fn send_notification(&mut self, message: ClientMessage) -> Result<()> {
        let message = message_json(&message)?;
        self.record(format!("notify:{}", method_of(&message)));
        Ok(())
    }

    fn set_protocol_version(&mut self, version: &str) {
        if let Ok(mut log) = self.log.lock() {
            log.protocol_version = Some(version.to_string());
        }
    }

    async fn end_session(&mut self) -> Result<()> {
        self.record("end_session".to_string());
        if self.fail_end_session {
            return Err(McpError::transport("HTTP error: 500 Internal Server Error"));
        }
        Ok(())
    }

    async fn close_stream(&mut self) -> Result<()> {
        self.record("close_stream".to_string());
        if self.fail_close_stream {
            return Err(McpError::transport("stream reset"));
        }
        Ok(())
    }
}

/// Completion service replaying queued replies and recording each history
/// it was asked about.
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<std::result::Result<Message, CompletionError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
    offered_tools: Mutex<Vec<Vec<String>>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<std::result::Result<Message, CompletionError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Tool names offered on each call.
    pub fn offered_tools(&self) -> Vec<Vec<String>> {
        self.offered_tools
            .lock()
            .map(|offered| offered.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn get_completion(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> std::result::Result<Message, CompletionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(history.to_vec());
        }
        if let Ok(mut offered) = self.offered_tools.lock() {
            offered.push(tools.iter().map(|tool| tool.name().to_string()).collect());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| Err(CompletionError::Request("no scripted reply left".to_string())))
    }
}
