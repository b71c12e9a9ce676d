//! MCP session handle.
//!
//! [`McpClient`] owns a transport and walks the session through
//! `Unopened → Open → Closed`. Catalog and tool operations live in the
//! sibling `catalog` and `invoker` modules and all require an open session.

mod catalog;
mod invoker;
mod protocol;


use crate::mcp::error::{McpError, Result};
use crate::mcp::transport::McpTransport;
use futures_util::future::BoxFuture;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
};
use rust_mcp_schema::{
    ClientCapabilities, Implementation, InitializeRequestParams, InitializeResult, RequestId,
    ServerCapabilities, LATEST_PROTOCOL_VERSION,
};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Upper bound on the number of tools kept from `tools/list`.
pub const MCP_MAX_TOOL_LIST: usize = 100;
/// Upper bound on pages followed for any list call.
pub const MCP_MAX_LIST_PAGES: usize = 20;

#[derive(Debug)]
pub enum SessionState {
    Unopened,
    Open(Box<InitializeResult>),
    Closed,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unopened => "unopened",
            SessionState::Open(_) => "open",
            SessionState::Closed => "closed",
        }
    }
}

pub struct McpClient {
    transport: Box<dyn McpTransport>,
    state: SessionState,
    protocol_version: String,
    next_request_id: i64,
}

impl McpClient {
    pub fn new(transport: Box<dyn McpTransport>) -> Self {
        Self {
            transport,
            state: SessionState::Unopened,
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            next_request_id: 0,
        }
    }

    /// Overrides the protocol version offered in `initialize`.
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    /// Details the server reported in `initialize`, while the session is open.
    pub fn server_details(&self) -> Option<&InitializeResult> {
        match &self.state {
            SessionState::Open(details) => Some(details),
            SessionState::Unopened | SessionState::Closed => None,
        }
    }

    fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_details().map(|details| &details.capabilities)
    }

    pub fn supports_tools(&self) -> bool {
        self.server_capabilities()
            .map(|caps| caps.tools.is_some())
            .unwrap_or(true)
    }

    pub fn supports_resources(&self) -> bool {
        self.server_capabilities()
            .map(|caps| caps.resources.is_some())
            .unwrap_or(true)
    }

    pub fn supports_prompts(&self) -> bool {
        self.server_capabilities()
            .map(|caps| caps.prompts.is_some())
            .unwrap_or(true)
    }

    /// Establishes the stream, then negotiates the session.
    ///
    /// On failure everything acquired so far is released and the handle ends
    /// up `Closed`; the error is always [`McpError::Connection`].
    pub async fn open(&mut self) -> Result<ServerCapabilities> {
        match self.state {
            SessionState::Unopened => {}
            SessionState::Open(_) => {
                return Err(McpError::connection("session is already open"));
            }
            SessionState::Closed => return Err(McpError::NotConnected),
        }

        if let Err(err) = self.transport.open_stream().await {
            self.state = SessionState::Closed;
            return Err(into_connection_error(err));
        }

        match self.negotiate().await {
            Ok(details) => {
                info!(
                    server = %details.server_info.name,
                    version = %details.server_info.version,
                    protocol = %details.protocol_version,
                    "MCP session open"
                );
                let capabilities = details.capabilities.clone();
                self.state = SessionState::Open(Box::new(details));
                Ok(capabilities)
            }
            Err(err) => {
                self.state = SessionState::Closed;
                self.release_partial().await;
                Err(into_connection_error(err))
            }
        }
    }

    async fn negotiate(&mut self) -> Result<InitializeResult> {
        let params = client_details_for(&self.protocol_version);
        self.transport.set_protocol_version(&params.protocol_version);

        let response = self
            .send_request(RequestFromClient::InitializeRequest(params))
            .await?;
        let details = protocol::parse_initialize_result(response)?;
        if details.protocol_version != self.protocol_version {
            debug!(
                requested = %self.protocol_version,
                negotiated = %details.protocol_version,
                "Server negotiated a different protocol version"
            );
        }
        self.transport.set_protocol_version(&details.protocol_version);

        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await?;
        Ok(details)
    }

    async fn release_partial(&mut self) {
        if let Err(err) = self.transport.end_session().await {
            warn!(error = %err, "Failed to release MCP session after failed open");
        }
        if let Err(err) = self.transport.close_stream().await {
            warn!(error = %err, "Failed to close MCP stream after failed open");
        }
    }

    /// Ends the session, then closes the stream.
    ///
    /// The stream is closed even when ending the session fails; both failures
    /// are reported together in [`McpError::Teardown`].
    pub async fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(McpError::NotConnected);
        }
        self.state = SessionState::Closed;

        let session = self.transport.end_session().await.err();
        let stream = self.transport.close_stream().await.err();
        if session.is_none() && stream.is_none() {
            info!("MCP session closed");
            return Ok(());
        }
        Err(McpError::Teardown {
            session: session.map(Box::new),
            stream: stream.map(Box::new),
        })
    }

    /// Opens a session over `transport`, runs `body`, and closes the session
    /// on every exit path.
    ///
    /// An error from `body` wins over a teardown error, which is then only
    /// logged. A teardown error after a successful body is returned.
    pub async fn with_session<T, E, F>(
        transport: Box<dyn McpTransport>,
        body: F,
    ) -> std::result::Result<T, E>
    where
        E: From<McpError>,
        F: for<'a> FnOnce(&'a mut McpClient) -> BoxFuture<'a, std::result::Result<T, E>>,
    {
        McpClient::new(transport).scoped(body).await
    }

    /// Same as [`McpClient::with_session`] for an already configured client.
    pub async fn scoped<T, E, F>(mut self, body: F) -> std::result::Result<T, E>
    where
        E: From<McpError>,
        F: for<'a> FnOnce(&'a mut McpClient) -> BoxFuture<'a, std::result::Result<T, E>>,
    {
        self.open().await?;
        let outcome = body(&mut self).await;
        let teardown = if self.is_open() {
            self.close().await
        } else {
            Ok(())
        };

        match (outcome, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(teardown_err)) => {
                warn!(error = %teardown_err, "MCP teardown failed after an earlier error");
                Err(err)
            }
        }
    }

    /// Sends a request on the open session and returns its `result`.
    pub(crate) async fn request(&mut self, request: RequestFromClient) -> Result<Value> {
        if !self.is_open() {
            return Err(McpError::NotConnected);
        }
        self.send_request(request).await
    }

    async fn send_request(&mut self, request: RequestFromClient) -> Result<Value> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(RequestId::Integer(request_id)),
        )
        .map_err(|err| McpError::protocol(err.to_string()))?;

        let response = self.transport.send_request(message).await?;
        if let Some(id) = response.get("id").and_then(Value::as_i64) {
            if id != request_id {
                debug!(expected = request_id, received = id, "MCP response id mismatch");
            }
        }
        protocol::parse_response_value(response)
    }

    async fn send_notification(&mut self, notification: NotificationFromClient) -> Result<()> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| McpError::protocol(err.to_string()))?;
        self.transport.send_notification(message).await
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("MCP client dropped with an open session; session was not closed");
        }
    }
}

fn into_connection_error(err: McpError) -> McpError {
    match err {
        McpError::Connection(_) => err,
        other => McpError::Connection(other.to_string()),
    }
}

fn client_details_for(protocol_version: &str) -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("MCP console agent".to_string()),
            description: Some(env!("CARGO_PKG_DESCRIPTION").to_string()),
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version: protocol_version.to_string(),
    }
}
