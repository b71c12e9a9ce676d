//! Console conversation loop.
//!
//! The orchestrator owns the conversation history for one run. Each user
//! line becomes a user message; the model may answer directly or request
//! tool calls, which are executed over the MCP session and fed back until the
//! model produces a plain answer or the round limit is reached.

use std::io::Write;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::api::ToolDescriptor;
use crate::core::chat_stream::CompletionService;
use crate::core::constants::{EXIT_COMMAND, MCP_PROMPT_HEADING};
use crate::core::message::{ConversationHistory, Message, ToolCall};
use crate::mcp::client::McpClient;
use crate::mcp::error::McpError;
use crate::utils::logging::TranscriptLog;

pub const USER_PROMPT: &str = "You: ";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error("console I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// How a single user turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model produced a message without tool calls.
    Answered,
    /// The model kept requesting tools past the configured limit.
    RoundLimit,
    /// The completion request failed; the error was shown to the user.
    CompletionFailed,
}

/// Returns true when `line` is the exit sentinel, compared without regard to
/// case. Surrounding whitespace makes it ordinary input.
pub fn is_exit_command(line: &str) -> bool {
    line.eq_ignore_ascii_case(EXIT_COMMAND)
}

pub struct Orchestrator<C: CompletionService> {
    completion: C,
    history: ConversationHistory,
    tools: Vec<ToolDescriptor>,
    max_tool_rounds: usize,
    transcript: Option<TranscriptLog>,
}

impl<C: CompletionService> Orchestrator<C> {
    pub fn new(completion: C, system_prompt: impl Into<String>, max_tool_rounds: usize) -> Self {
        Self {
            completion,
            history: ConversationHistory::new(system_prompt),
            tools: Vec::new(),
            max_tool_rounds,
            transcript: None,
        }
    }

    pub fn with_transcript(mut self, transcript: Option<TranscriptLog>) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn completion(&self) -> &C {
        &self.completion
    }

    /// Loads the tool catalog and appends one user message per server prompt.
    ///
    /// Prompts that fail to fetch are logged and skipped.
    pub async fn seed(&mut self, client: &mut McpClient) -> Result<(), AgentError> {
        self.tools = client.list_tools().await?;
        debug!(tools = self.tools.len(), "Loaded MCP tool catalog");

        for prompt in client.list_prompts().await? {
            match client.get_prompt(&prompt.name).await {
                Ok(content) => {
                    let description = prompt.description.as_deref().unwrap_or_default();
                    self.push(Message::user(format!(
                        "{MCP_PROMPT_HEADING}\n{description}\n{content}"
                    )));
                    info!(prompt = %prompt.name, "Seeded MCP prompt");
                }
                Err(err) => warn!(prompt = %prompt.name, error = %err, "Skipping MCP prompt"),
            }
        }
        Ok(())
    }

    /// Reads lines from `input` until end of input or the exit sentinel,
    /// running one turn per non-blank line.
    pub async fn run<R, W>(
        &mut self,
        client: &mut McpClient,
        input: R,
        output: &mut W,
    ) -> Result<(), AgentError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        loop {
            write!(output, "{USER_PROMPT}")?;
            output.flush()?;

            let Some(line) = lines.next_line().await? else {
                writeln!(output)?;
                debug!("End of console input");
                return Ok(());
            };
            if is_exit_command(&line) {
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }
            self.handle_turn(client, line, output).await?;
        }
    }

    /// Runs one user turn, including every tool round it triggers.
    pub async fn handle_turn<W: Write>(
        &mut self,
        client: &mut McpClient,
        line: String,
        output: &mut W,
    ) -> Result<TurnOutcome, AgentError> {
        self.push(Message::user(line));

        let mut rounds = 0;
        loop {
            let reply = match self
                .completion
                .get_completion(self.history.messages(), &self.tools)
                .await
            {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(error = %err, "Completion failed");
                    writeln!(output, "❌ {err}\n")?;
                    return Ok(TurnOutcome::CompletionFailed);
                }
            };

            if !reply.content.trim().is_empty() {
                writeln!(output, "🤖: {}\n", reply.content)?;
            }
            if !reply.has_tool_calls() {
                self.push(reply);
                return Ok(TurnOutcome::Answered);
            }

            let calls = reply.tool_calls.clone();
            self.push(reply);

            if rounds == self.max_tool_rounds {
                for call in &calls {
                    self.push(Message::tool(
                        call.id.clone(),
                        format!(
                            "Error: tool call not executed; limit of {} tool rounds reached",
                            self.max_tool_rounds
                        ),
                    ));
                }
                warn!(limit = self.max_tool_rounds, "Tool round limit reached");
                writeln!(
                    output,
                    "⚠️  Stopped after {} tool rounds without a final answer.\n",
                    self.max_tool_rounds
                )?;
                return Ok(TurnOutcome::RoundLimit);
            }
            rounds += 1;

            for call in calls {
                let result = self.execute(client, &call, output).await?;
                self.push(Message::tool(call.id, result));
            }
        }
    }

    async fn execute<W: Write>(
        &self,
        client: &mut McpClient,
        call: &ToolCall,
        output: &mut W,
    ) -> Result<String, AgentError> {
        writeln!(output, "    🔧 {}({})", call.name, call.arguments)?;
        let result = match call.parsed_arguments() {
            Ok(arguments) => match client.call_tool(&call.name, arguments).await {
                Ok(content) => content.to_message_text(),
                Err(err) => {
                    warn!(tool = %call.name, error = %err, "Tool call failed");
                    format!("Error: {err}")
                }
            },
            Err(reason) => format!("Error: {reason}"),
        };
        writeln!(output, "    ⚙️: {result}\n")?;
        Ok(result)
    }

    fn push(&mut self, message: Message) {
        if let Some(transcript) = &self.transcript {
            if let Err(err) = transcript.record(&message) {
                warn!(
                    path = %transcript.path().display(),
                    error = %err,
                    "Failed to write transcript"
                );
            }
        }
        self.history.push(message);
    }
}
