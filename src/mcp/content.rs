//! Decoding of MCP content payloads.
//!
//! Resource reads, prompt messages, and tool results all carry content items.
//! Every item is classified into exactly one [`Content`] variant; nothing that
//! is not text is ever passed along as text.
//!
//! Two wire shapes exist:
//! - content blocks ([`ContentBlock`]), tagged by `type`, used by tool results
//!   and prompt messages. Only text blocks are interpreted; any other block is
//!   kept as sent in [`Content::Unknown`].
//! - resource contents ([`ReadResourceContent`]), carrying either `text` or a
//!   base64 `blob`, used by `resources/read`.

use base64::Engine;
use rust_mcp_schema::{ContentBlock, ReadResourceContent, TextContent};
use serde_json::Value;

use super::error::{McpError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Binary(Vec<u8>),
    /// An item the client does not decode. `kind` is its tag when it had one.
    Unknown { kind: Option<String>, raw: Value },
}

impl Content {
    /// Classifies a decoded content block.
    pub fn from_block(block: ContentBlock) -> Self {
        match block {
            ContentBlock::TextContent(text) => Content::Text(text.text),
            other @ (ContentBlock::ImageContent(_)
            | ContentBlock::AudioContent(_)
            | ContentBlock::ResourceLink(_)
            | ContentBlock::EmbeddedResource(_)) => {
                uninterpreted(serde_json::to_value(&other).unwrap_or_default())
            }
        }
    }

    /// Short label used in logs and console diagnostics.
    pub fn kind_label(&self) -> String {
        match self {
            Content::Text(_) => "text".to_string(),
            Content::Binary(_) => "binary".to_string(),
            Content::Unknown { kind: Some(kind), .. } => kind.clone(),
            Content::Unknown { kind: None, .. } => "unknown".to_string(),
        }
    }

    /// Renders the content for a chat message sent back to the model.
    pub fn to_message_text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Binary(bytes) => format!("[binary content: {} bytes]", bytes.len()),
            Content::Unknown { raw, .. } => raw.to_string(),
        }
    }
}

/// Resolves the body of a prompt message.
///
/// A bare JSON string is treated as text, matching servers that send prompt
/// content without the block wrapper. Blocks of any other kind, including ones
/// the protocol schema does not know, come back as [`Content::Unknown`]. Only
/// a `text` block that fails to decode is an error.
pub fn resolve_block(item: Value) -> Result<Content> {
    if let Value::String(text) = item {
        return Ok(Content::Text(text));
    }

    match serde_json::from_value::<ContentBlock>(item.clone()) {
        Ok(ContentBlock::TextContent(text)) => Ok(Content::Text(text.text)),
        Ok(_) => Ok(uninterpreted(item)),
        Err(err) if block_tag(&item) == Some(TextContent::type_value()) => {
            Err(McpError::protocol(format!("invalid text content: {err}")))
        }
        Err(_) => Ok(uninterpreted(item)),
    }
}

/// Resolves one entry of a `resources/read` result.
///
/// Fails with [`McpError::UnknownContentKind`] when the entry is neither text
/// nor blob.
pub fn resolve_resource_contents(item: Value) -> Result<Content> {
    match serde_json::from_value::<ReadResourceContent>(item.clone()) {
        Ok(ReadResourceContent::TextResourceContents(contents)) => {
            Ok(Content::Text(contents.text))
        }
        Ok(ReadResourceContent::BlobResourceContents(contents)) => {
            decode_base64(&contents.blob).map(Content::Binary)
        }
        Err(_) => Err(McpError::UnknownContentKind(describe(&item))),
    }
}

fn uninterpreted(raw: Value) -> Content {
    let kind = block_tag(&raw).map(str::to_string);
    Content::Unknown { kind, raw }
}

fn block_tag(item: &Value) -> Option<&str> {
    item.get("type").and_then(Value::as_str)
}

fn decode_base64(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|err| McpError::protocol(format!("invalid base64 content: {err}")))
}

fn describe(item: &Value) -> String {
    if let Some(kind) = block_tag(item) {
        return kind.to_string();
    }
    match item {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with fields [{}]", keys.join(", "))
        }
        other => other.to_string(),
    }
}
