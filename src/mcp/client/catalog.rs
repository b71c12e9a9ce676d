//! Discovery of tools, resources, and prompts, plus resource and prompt reads.

use rust_mcp_schema::schema_utils::RequestFromClient;
use rust_mcp_schema::{
    GetPromptRequestParams, PaginatedRequestParams, Prompt, ReadResourceRequestParams, Resource,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::protocol::{parse_list_prompts, parse_list_resources, parse_list_tools};
use super::{McpClient, MCP_MAX_LIST_PAGES, MCP_MAX_TOOL_LIST};
use crate::api::ToolDescriptor;
use crate::mcp::content::{resolve_block, resolve_resource_contents, Content};
use crate::mcp::error::{McpError, Result};
use crate::mcp::transport::ListFetch;

/// One decoded page of a list call: its entries and the cursor for the next.
type Page<T> = (Vec<T>, Option<String>);

fn tools_page(page: Value) -> Result<Page<ToolDescriptor>> {
    // ToolInputSchema keeps only a few keywords, so parameters come from the raw page.
    let schemas: Vec<Value> = page
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .map(|tool| tool.get("inputSchema").cloned().unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();
    let result = parse_list_tools(page)?;

    let tools = result
        .tools
        .into_iter()
        .zip(schemas)
        .map(|(tool, schema)| {
            ToolDescriptor::function(tool.name, tool.description.unwrap_or_default(), schema)
        })
        .collect();
    Ok((tools, result.next_cursor))
}

fn resources_page(page: Value) -> Result<Page<Resource>> {
    let result = parse_list_resources(page)?;
    Ok((result.resources, result.next_cursor))
}

fn prompts_page(page: Value) -> Result<Page<Prompt>> {
    let result = parse_list_prompts(page)?;
    Ok((result.prompts, result.next_cursor))
}

fn paginated_params(cursor: Option<String>) -> Option<PaginatedRequestParams> {
    cursor.map(|cursor| PaginatedRequestParams {
        cursor: Some(cursor),
        meta: None,
    })
}

impl McpClient {
    /// Lists tools in the function-calling shape, input schemas verbatim.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        if !self.is_open() {
            return Err(McpError::NotConnected);
        }
        if !self.supports_tools() {
            debug!("MCP server does not advertise tools");
            return Ok(Vec::new());
        }

        self.list_paged(
            RequestFromClient::ListToolsRequest,
            tools_page,
            "tools",
            MCP_MAX_TOOL_LIST,
        )
        .await
    }

    /// Lists resources. Anything but a closed session yields a list, empty
    /// when the server cannot provide one.
    pub async fn list_resources(&mut self) -> Result<Vec<Resource>> {
        if !self.is_open() {
            return Err(McpError::NotConnected);
        }
        let fetch = if self.supports_resources() {
            self.list_paged(
                RequestFromClient::ListResourcesRequest,
                resources_page,
                "resources",
                usize::MAX,
            )
            .await
        } else {
            Err(McpError::CapabilityUnavailable("resources"))
        };
        Ok(best_effort(fetch, "resources"))
    }

    /// Lists prompts, with the same best-effort rules as
    /// [`McpClient::list_resources`].
    pub async fn list_prompts(&mut self) -> Result<Vec<Prompt>> {
        if !self.is_open() {
            return Err(McpError::NotConnected);
        }
        let fetch = if self.supports_prompts() {
            self.list_paged(
                RequestFromClient::ListPromptsRequest,
                prompts_page,
                "prompts",
                usize::MAX,
            )
            .await
        } else {
            Err(McpError::CapabilityUnavailable("prompts"))
        };
        Ok(best_effort(fetch, "prompts"))
    }

    /// Reads a resource and resolves its first content item.
    ///
    /// Only that item is decoded, so an odd entry further down the list does
    /// not fail the read.
    pub async fn get_resource(&mut self, uri: &str) -> Result<Content> {
        let params = ReadResourceRequestParams {
            meta: None,
            uri: uri.to_string(),
        };
        let mut result = self
            .request(RequestFromClient::ReadResourceRequest(params))
            .await?;

        let first = take_first(&mut result, "contents")?
            .ok_or(McpError::EmptyContent("resource read"))?;
        resolve_resource_contents(first)
    }

    /// Fetches a prompt and joins its text contents, one line per message.
    ///
    /// Messages are read one by one rather than as a whole `GetPromptResult`:
    /// a bare-string body counts as text and non-text bodies are skipped.
    pub async fn get_prompt(&mut self, name: &str) -> Result<String> {
        let params = GetPromptRequestParams {
            name: name.to_string(),
            arguments: None,
            meta: None,
        };
        let mut result = self
            .request(RequestFromClient::GetPromptRequest(params))
            .await?;

        let messages = match result.get_mut("messages").map(Value::take) {
            Some(Value::Array(messages)) => messages,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(McpError::protocol(format!(
                    "prompt messages must be a list, got {other}"
                )))
            }
        };

        let mut combined = String::new();
        for mut message in messages {
            let Some(content) = message.get_mut("content").map(Value::take) else {
                continue;
            };
            match resolve_block(content)? {
                Content::Text(text) => {
                    combined.push_str(&text);
                    combined.push('\n');
                }
                other @ (Content::Binary(_) | Content::Unknown { .. }) => {
                    debug!(
                        prompt = name,
                        kind = %other.kind_label(),
                        "Skipping non-text prompt content"
                    );
                }
            }
        }
        Ok(combined)
    }

    async fn list_paged<T>(
        &mut self,
        make_request: fn(Option<PaginatedRequestParams>) -> RequestFromClient,
        parse_page: fn(Value) -> Result<Page<T>>,
        kind: &'static str,
        limit: usize,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor = None;

        for _ in 0..MCP_MAX_LIST_PAGES {
            let page = self
                .request(make_request(paginated_params(cursor.take())))
                .await?;
            let (entries, next_cursor) = parse_page(page)?;
            items.extend(entries);

            if items.len() >= limit {
                if items.len() > limit {
                    warn!(kind, limit, "MCP list truncated");
                    items.truncate(limit);
                }
                return Ok(items);
            }

            cursor = next_cursor.filter(|next| !next.is_empty());
            if cursor.is_none() {
                return Ok(items);
            }
        }

        warn!(kind, pages = MCP_MAX_LIST_PAGES, "Stopped following MCP list cursor");
        Ok(items)
    }
}

fn best_effort<T>(fetch: Result<Vec<T>>, kind: &'static str) -> Vec<T> {
    match ListFetch::from_result(fetch) {
        ListFetch::Ok(list) => list,
        ListFetch::Unsupported => {
            info!(kind, "MCP server does not support {kind}");
            Vec::new()
        }
        ListFetch::Err(err) => {
            warn!(kind, error = %err, "Error fetching {kind}");
            Vec::new()
        }
    }
}

/// Removes and returns the first element of the list stored under `field`.
fn take_first(result: &mut Value, field: &str) -> Result<Option<Value>> {
    match result.get_mut(field) {
        Some(Value::Array(items)) if items.is_empty() => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items.remove(0))),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(McpError::protocol(format!(
            "`{field}` must be a list, got {other}"
        ))),
    }
}
