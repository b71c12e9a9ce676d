use rust_mcp_schema::schema_utils::RequestFromClient;
use rust_mcp_schema::{CallToolRequestParams, ContentBlock};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::protocol::parse_call_tool;
use super::McpClient;
use crate::mcp::content::Content;
use crate::mcp::error::{McpError, Result};

impl McpClient {
    /// Runs a tool and resolves the first item of its result.
    ///
    /// Arguments are forwarded untouched. A result flagged `isError` becomes
    /// [`McpError::RemoteTool`]; anything but text is handed back as sent.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Content> {
        let params = CallToolRequestParams::new(name).with_arguments(arguments);
        debug!(tool = name, "Calling MCP tool");
        let result = self
            .request(RequestFromClient::CallToolRequest(params))
            .await?;
        let result = parse_call_tool(result)?;

        if result.is_error == Some(true) {
            return Err(McpError::RemoteTool(error_text(&result.content)));
        }

        let first = result
            .content
            .into_iter()
            .next()
            .ok_or(McpError::EmptyContent("tool call"))?;
        let content = Content::from_block(first);
        match &content {
            Content::Text(text) => info!(tool = name, content = %text, "Tool result"),
            Content::Binary(bytes) => {
                info!(tool = name, bytes = bytes.len(), "Tool result (binary)")
            }
            Content::Unknown { raw, .. } => info!(
                tool = name,
                kind = %content.kind_label(),
                content = %raw,
                "Tool result (uninterpreted)"
            ),
        }
        Ok(content)
    }
}

fn error_text(content: &[ContentBlock]) -> String {
    let texts: Vec<&str> = content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::TextContent(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect();
    if texts.is_empty() {
        "tool reported an error without details".to_string()
    } else {
        texts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_mcp_schema::{ImageContent, TextContent};

    fn text(value: &str) -> ContentBlock {
        TextContent::new(value.to_string(), None, None).into()
    }

    #[test]
    fn error_text_joins_text_items() {
        let content = vec![
            text("user 7 not found"),
            ImageContent::new("AA==".to_string(), "image/png".to_string(), None, None).into(),
            text("try search_user"),
        ];
        assert_eq!(error_text(&content), "user 7 not found\ntry search_user");
    }

    #[test]
    fn error_text_without_content_has_fallback() {
        assert_eq!(error_text(&[]), "tool reported an error without details");
    }
}
