//! Transport abstraction beneath the MCP session.
//!
//! A transport owns two resources with separate lifetimes: the stream (the
//! connection to the server) and the session the server hands out during
//! `initialize`. [`crate::mcp::client::McpClient`] drives them in order:
//! `open_stream`, requests, then `end_session` before `close_stream`.

use crate::mcp::error::{McpError, Result};
use async_trait::async_trait;
use rust_mcp_schema::schema_utils::ClientMessage;
use serde_json::Value;

pub mod streamable_http;

pub use streamable_http::{HttpTransportConfig, StreamableHttpTransport};

/// JSON-RPC code used by servers to indicate unsupported methods.
pub const MCP_METHOD_NOT_FOUND: i64 = -32601;

#[async_trait]
/// Transport contract required by the session handle.
///
/// Requests return the raw JSON-RPC message that answered them; decoding of
/// `result` and `error` happens in the client.
pub trait McpTransport: Send {
    async fn open_stream(&mut self) -> Result<()>;

    async fn send_request(&mut self, message: ClientMessage) -> Result<Value>;

    async fn send_notification(&mut self, message: ClientMessage) -> Result<()>;

    /// Records the protocol version agreed during `initialize`.
    fn set_protocol_version(&mut self, version: &str);

    /// Releases the server-side session. A transport without a session
    /// returns `Ok(())`.
    async fn end_session(&mut self) -> Result<()>;

    async fn close_stream(&mut self) -> Result<()>;
}

/// Normalized outcome for best-effort list calls.
#[derive(Debug)]
pub enum ListFetch<T> {
    Ok(T),
    /// The capability is absent: either not advertised or the server
    /// answered "method not found".
    Unsupported,
    Err(McpError),
}

impl<T> ListFetch<T> {
    /// Converts a list call result, keeping "method not found" as a soft
    /// capability signal.
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(list) => ListFetch::Ok(list),
            Err(err) if err.is_method_not_found() => ListFetch::Unsupported,
            Err(McpError::CapabilityUnavailable(_)) => ListFetch::Unsupported,
            Err(err) => ListFetch::Err(err),
        }
    }
}
