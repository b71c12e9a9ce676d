use serde_json::{Map, Value};

use crate::api::{ChatMessage, ChatToolCall, ChatToolCallFunction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON object text exactly as the model produced it.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parses the argument text into a JSON object. Blank text is an empty
    /// object.
    pub fn parsed_arguments(&self) -> Result<Map<String, Value>, String> {
        let raw = self.arguments.trim();
        if raw.is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(format!("tool arguments must be a JSON object, got {other}")),
            Err(err) => Err(format!("tool arguments are not valid JSON: {err}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool messages: the call this message answers.
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn to_api(&self) -> ChatMessage {
        let tool_calls = self.has_tool_calls().then(|| {
            self.tool_calls
                .iter()
                .map(|call| ChatToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: ChatToolCallFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect()
        });
        ChatMessage {
            role: self.role.as_str().to_string(),
            content: self.content.clone(),
            tool_call_id: self.tool_call_id.clone(),
            tool_calls,
        }
    }
}

/// Ordered conversation record. The first entry is the system message and
/// entries are only ever appended.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_use_chat_api_names() {
        let names: Vec<&str> = [Role::System, Role::User, Role::Assistant, Role::Tool]
            .into_iter()
            .map(Role::as_str)
            .collect();
        assert_eq!(names, vec!["system", "user", "assistant", "tool"]);
    }

    #[test]
    fn history_starts_with_system_message() {
        let mut history = ConversationHistory::new("be helpful");
        history.push(Message::user("hi"));
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0], Message::system("be helpful"));
        assert_eq!(history.last().map(|m| m.role), Some(Role::User));
    }

    #[test]
    fn tool_call_arguments_parse_as_object() {
        let call = ToolCall::new("call_1", "get_user", r#"{"id":"7"}"#);
        let args = call.parsed_arguments().expect("object arguments");
        assert_eq!(args.get("id").and_then(Value::as_str), Some("7"));

        let blank = ToolCall::new("c", "t", "  ");
        assert!(blank.parsed_arguments().expect("blank").is_empty());
        assert!(ToolCall::new("c", "t", "[1]").parsed_arguments().is_err());
        assert!(ToolCall::new("c", "t", "{oops").parsed_arguments().is_err());
    }

    #[test]
    fn api_message_carries_tool_fields() {
        let assistant = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("call_1", "get_user", r#"{"id":"7"}"#)],
        );
        let api = serde_json::to_value(assistant.to_api()).expect("serialize");
        assert_eq!(api["role"], "assistant");
        assert_eq!(api["tool_calls"][0]["type"], "function");
        assert_eq!(api["tool_calls"][0]["function"]["name"], "get_user");
        assert!(api.get("tool_call_id").is_none());

        let tool =
            serde_json::to_value(Message::tool("call_1", "Jane").to_api()).expect("serialize");
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_1");
        assert!(tool.get("tool_calls").is_none());
    }
}
