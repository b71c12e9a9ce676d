//! Error types for MCP session, catalog, and tool operations.

use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The stream could not be established or the session handshake failed.
    #[error("failed to connect to MCP server: {0}")]
    Connection(String),

    /// An operation was attempted on a session that is not open.
    #[error("MCP client not connected")]
    NotConnected,

    /// The server does not offer the requested capability.
    #[error("MCP server does not support {0}")]
    CapabilityUnavailable(&'static str),

    /// A content item carried a tag the client cannot decode.
    #[error("unknown content kind: {0}")]
    UnknownContentKind(String),

    /// A result that must carry at least one content item carried none.
    #[error("{0} returned no content")]
    EmptyContent(&'static str),

    /// The tool ran and reported a failure.
    #[error("tool error: {0}")]
    RemoteTool(String),

    /// The server answered with a JSON-RPC error.
    #[error("MCP error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// HTTP-level failure while talking to the server.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server sent something that does not follow the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Teardown failed for the session, the stream, or both.
    #[error("{}", format_teardown(session.as_deref(), stream.as_deref()))]
    Teardown {
        session: Option<Box<McpError>>,
        stream: Option<Box<McpError>>,
    },
}

impl McpError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Returns true when the server reported JSON-RPC "method not found".
    pub fn is_method_not_found(&self) -> bool {
        matches!(self, Self::Rpc { code, .. } if *code == crate::mcp::transport::MCP_METHOD_NOT_FOUND)
    }
}

fn format_teardown(session: Option<&McpError>, stream: Option<&McpError>) -> String {
    match (session, stream) {
        (Some(session), Some(stream)) => {
            format!("session teardown failed: {session}; stream teardown failed: {stream}")
        }
        (Some(session), None) => format!("session teardown failed: {session}"),
        (None, Some(stream)) => format!("stream teardown failed: {stream}"),
        (None, None) => "teardown failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_reports_both_failures() {
        let err = McpError::Teardown {
            session: Some(Box::new(McpError::transport("HTTP error: 500"))),
            stream: Some(Box::new(McpError::transport("reset"))),
        };
        let text = err.to_string();
        assert!(text.contains("session teardown failed"));
        assert!(text.contains("HTTP error: 500"));
        assert!(text.contains("stream teardown failed: transport error: reset"));
    }

    #[test]
    fn method_not_found_is_detected_from_rpc_code() {
        let err = McpError::Rpc {
            code: -32601,
            message: "Method not found".to_string(),
            data: None,
        };
        assert!(err.is_method_not_found());
        assert!(!McpError::NotConnected.is_method_not_found());
    }
}
