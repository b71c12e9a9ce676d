use crate::mcp::error::{McpError, Result};
use rust_mcp_schema::{
    CallToolResult, InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult,
    RpcError,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub(crate) fn parse_initialize_result(value: Value) -> Result<InitializeResult> {
    let result = serde_json::from_value::<InitializeResult>(value)
        .map_err(|err| McpError::protocol(format!("invalid initialize result: {err}")))?;
    if result.protocol_version.trim().is_empty() {
        return Err(McpError::protocol("initialize result without protocol version"));
    }
    Ok(result)
}

pub(crate) fn parse_list_tools(value: Value) -> Result<ListToolsResult> {
    parse_result(value, "tools/list")
}

pub(crate) fn parse_list_resources(value: Value) -> Result<ListResourcesResult> {
    parse_result(value, "resources/list")
}

pub(crate) fn parse_list_prompts(value: Value) -> Result<ListPromptsResult> {
    parse_result(value, "prompts/list")
}

pub(crate) fn parse_call_tool(value: Value) -> Result<CallToolResult> {
    parse_result(value, "tools/call")
}

fn parse_result<T: DeserializeOwned>(value: Value, method: &str) -> Result<T> {
    serde_json::from_value::<T>(value)
        .map_err(|err| McpError::protocol(format!("invalid {method} result: {err}")))
}

/// Extracts `result` from a JSON-RPC response, turning `error` into
/// [`McpError::Rpc`].
pub(crate) fn parse_response_value(message: Value) -> Result<Value> {
    let Value::Object(mut message) = message else {
        return Err(McpError::protocol(format!(
            "expected a JSON-RPC object, got {message}"
        )));
    };

    if let Some(error) = message.remove("error") {
        let error = serde_json::from_value::<RpcError>(error)
            .map_err(|err| McpError::protocol(format!("malformed JSON-RPC error: {err}")))?;
        return Err(rpc_error(error));
    }

    message
        .remove("result")
        .ok_or_else(|| McpError::protocol("JSON-RPC response without result"))
}

fn rpc_error(error: RpcError) -> McpError {
    let mut message = error.message;
    if let Some(details) = error.data.as_ref().and_then(rpc_error_details) {
        if !details.is_empty() {
            message.push('\n');
            message.push_str(&details);
        }
    }
    McpError::Rpc {
        code: error.code,
        message,
        data: error.data,
    }
}

fn rpc_error_details(data: &Value) -> Option<String> {
    data.get("details")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| data.as_str().map(str::to_string))
        .or_else(|| serde_json::to_string_pretty(data).ok())
}
