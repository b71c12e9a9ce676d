//! mcp-agent is a console agent that lets an LLM work through the tools,
//! resources, and prompts of a Model Context Protocol server.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`mcp`] owns the MCP session: the streamable-HTTP transport, session
//!   lifecycle, capability discovery, tool invocation, and content decoding.
//! - [`core`] holds configuration, the conversation history, the streaming
//!   completion client, and the orchestrator that runs the console loop.
//! - [`api`] defines the chat-completion payloads and the tool descriptor
//!   shape sent to the model.
//! - [`utils`] carries URL construction, auth headers, and the transcript log.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], which
//! resolves settings, opens the session, and hands control to
//! [`core::orchestrator::Orchestrator`].

pub mod api;
pub mod cli;
pub mod core;
pub mod mcp;
pub mod utils;
