//! Command-line interface parsing and startup.
//!
//! Resolves settings, opens the MCP session, prints what the server offers,
//! and hands the console over to the conversation loop.

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use futures_util::FutureExt;
use rust_mcp_schema::Resource;
use tokio::io::AsyncBufRead;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::api::ToolDescriptor;
use crate::core::chat_stream::{ChatCompletionClient, CompletionService};
use crate::core::config::{ApiFlavor, Config, McpSettings, Overrides, Settings};
use crate::core::orchestrator::{AgentError, Orchestrator};
use crate::mcp::client::McpClient;
use crate::mcp::transport::{HttpTransportConfig, StreamableHttpTransport};
use crate::utils::logging::TranscriptLog;

const DEFAULT_LOG_FILTER: &str = "warn";
const STDIN_SHUTDOWN_GRACE_MS: u64 = 100;

#[derive(Parser, Debug)]
#[command(name = "mcp-agent", version)]
#[command(about = "A console agent that uses the tools of an MCP server")]
#[command(
    long_about = "mcp-agent connects to a Model Context Protocol server over streamable HTTP, \
lists its resources and tools, seeds the conversation with its prompts, and chats through an \
OpenAI-compatible completion API. Tool calls requested by the model are executed on the server \
and their results fed back to the model.\n\n\
Environment Variables:\n\
  MCP_SERVER_URL    MCP endpoint (default http://localhost:8005/mcp)\n\
  MCP_AUTH_TOKEN    Bearer token sent to the MCP server (optional)\n\
  OPENAI_API_KEY    API key for --api openai (required for that mode)\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\
  DIAL_API_KEY      API key for --api dial (optional)\n\
  DIAL_BASE_URL     DIAL endpoint (optional)\n\
  RUST_LOG          Diagnostic filter when --log-level is not given\n\n\
Type 'exit' or press Ctrl+C to quit."
)]
pub struct Args {
    /// Config file to read instead of the platform default
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// MCP server endpoint
    #[arg(short = 's', long, value_name = "URL")]
    pub server_url: Option<String>,

    /// Completion API flavor: openai or dial
    #[arg(long, value_name = "API")]
    pub api: Option<ApiFlavor>,

    /// Model (or DIAL deployment) to chat with
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Completion API base URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Maximum tool rounds per user turn
    #[arg(long, value_name = "N")]
    pub max_tool_rounds: Option<usize>,

    /// File whose contents replace the built-in system prompt
    #[arg(long, value_name = "FILE")]
    pub system_prompt_file: Option<PathBuf>,

    /// Append the conversation transcript to this file
    #[arg(short = 'l', long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Diagnostic filter, e.g. `info` or `mcp_agent=debug`
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            server_url: self.server_url.clone(),
            api: self.api,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            max_tool_rounds: self.max_tool_rounds,
            system_prompt_file: self.system_prompt_file.clone(),
            transcript: self.log.clone(),
        }
    }

    fn load_settings(&self) -> Result<Settings, Box<dyn Error>> {
        let config = match &self.config {
            Some(path) => Config::load_from_path(path)?,
            None => Config::load()?,
        };
        Ok(Settings::from_environment(config, self.overrides())?)
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async_main(args));
    // A pending stdin read would otherwise hold the runtime open after Ctrl-C.
    runtime.shutdown_timeout(Duration::from_millis(STDIN_SHUTDOWN_GRACE_MS));
    result
}

/// Diagnostics go to stderr so they never interleave with the conversation.
fn init_tracing(log_level: Option<&str>) {
    let filter = log_level
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .init();
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let settings = match args.load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };

    let transcript = match settings.transcript.as_deref().map(TranscriptLog::open) {
        Some(Ok(log)) => Some(log),
        Some(Err(e)) => {
            eprintln!("❌ Cannot write transcript: {e}");
            std::process::exit(1);
        }
        None => None,
    };

    let completion = match ChatCompletionClient::new(settings.completion.clone()) {
        Ok(completion) => completion,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };
    info!(endpoint = %completion.endpoint(), "Completion service ready");

    let orchestrator = Orchestrator::new(
        completion,
        settings.system_prompt.clone(),
        settings.max_tool_rounds,
    )
    .with_transcript(transcript);

    let interrupt = listen_for_interrupt();
    let outcome = build_client(&settings.mcp)
        .scoped(move |client| {
            Box::pin(async move {
                let input = tokio::io::BufReader::new(tokio::io::stdin());
                let mut stdout = std::io::stdout();
                run_session(client, orchestrator, input, &mut stdout, interrupt).await
            })
        })
        .await;

    if let Err(e) = outcome {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn build_client(settings: &McpSettings) -> McpClient {
    let mut config = HttpTransportConfig::new(settings.server_url.clone());
    if let Some(token) = settings.auth_token.as_deref() {
        config = config.with_bearer_token(token);
    }
    let client = McpClient::new(Box::new(StreamableHttpTransport::new(config)));
    match settings.protocol_version.as_deref() {
        Some(version) => client.with_protocol_version(version),
        None => client,
    }
}

/// Installs the Ctrl-C handler before the session opens, so an interrupt at
/// any point ends the session body and still reaches the teardown.
fn listen_for_interrupt() -> watch::Receiver<bool> {
    let (notify, interrupt) = watch::channel(false);
    let mut ctrl_c = Box::pin(tokio::signal::ctrl_c());

    // The first poll registers the handler.
    if let Some(Ok(())) = (&mut ctrl_c).now_or_never() {
        notify.send_replace(true);
        return interrupt;
    }
    tokio::spawn(async move {
        match ctrl_c.await {
            Ok(()) => {
                notify.send_replace(true);
            }
            Err(err) => warn!(error = %err, "Cannot listen for Ctrl-C"),
        }
    });
    interrupt
}

/// Resolves once an interrupt was signalled; never, if nothing can signal one.
async fn interrupted(mut interrupt: watch::Receiver<bool>) {
    if interrupt.wait_for(|signalled| *signalled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn run_session<C, R, W>(
    client: &mut McpClient,
    mut orchestrator: Orchestrator<C>,
    input: R,
    out: &mut W,
    interrupt: watch::Receiver<bool>,
) -> Result<(), AgentError>
where
    C: CompletionService,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let finished = tokio::select! {
        biased;
        () = interrupted(interrupt) => None,
        result = converse(client, &mut orchestrator, input, out) => Some(result),
    };

    match finished {
        Some(result) => result,
        None => {
            writeln!(out)?;
            info!("Interrupted; closing MCP session");
            Ok(())
        }
    }
}

async fn converse<C, R, W>(
    client: &mut McpClient,
    orchestrator: &mut Orchestrator<C>,
    input: R,
    out: &mut W,
) -> Result<(), AgentError>
where
    C: CompletionService,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    print_server_summary(client, out)?;
    let resources = client.list_resources().await?;
    orchestrator.seed(client).await?;
    print_catalog(&resources, orchestrator.tools(), out)?;
    writeln!(out, "\nStarting console chat. Type 'exit' to quit.")?;

    orchestrator.run(client, input, out).await
}

fn print_server_summary<W: Write>(client: &McpClient, out: &mut W) -> std::io::Result<()> {
    let Some(details) = client.server_details() else {
        return Ok(());
    };
    writeln!(
        out,
        "Connected to {} {} (protocol {})",
        details.server_info.name, details.server_info.version, details.protocol_version
    )?;

    let offered: Vec<&str> = [
        ("tools", client.supports_tools()),
        ("resources", client.supports_resources()),
        ("prompts", client.supports_prompts()),
    ]
    .into_iter()
    .filter_map(|(name, supported)| supported.then_some(name))
    .collect();
    if offered.is_empty() {
        writeln!(out, "Capabilities: none")?;
    } else {
        writeln!(out, "Capabilities: {}", offered.join(", "))?;
    }
    writeln!(out)
}

fn print_catalog<W: Write>(
    resources: &[Resource],
    tools: &[ToolDescriptor],
    out: &mut W,
) -> std::io::Result<()> {
    writeln!(out, "Available MCP Resources:")?;
    for resource in resources {
        match resource.description.as_deref().filter(|text| !text.is_empty()) {
            Some(description) => writeln!(out, "- {} ({description})", resource.name)?,
            None => writeln!(out, "- {} ({})", resource.name, resource.uri)?,
        }
    }

    writeln!(out, "\nAvailable MCP Tools:")?;
    for tool in tools {
        let description = &tool.function.description;
        if description.is_empty() {
            writeln!(out, "- {}", tool.name())?;
        } else {
            writeln!(out, "- {} ({description})", tool.name())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{ScriptedCompletion, ScriptedTransport};
    use serde_json::json;

    fn agent() -> Orchestrator<ScriptedCompletion> {
        Orchestrator::new(ScriptedCompletion::new(Vec::new()), "You manage users.", 3)
    }

    #[tokio::test]
    async fn interrupt_before_startup_still_closes_session() {
        let transport = ScriptedTransport::new();
        let log = transport.log();
        let (notify, interrupt) = watch::channel(false);
        notify.send_replace(true);
        let agent = agent();

        let output = McpClient::new(transport.boxed())
            .scoped(move |client| {
                Box::pin(async move {
                    let mut out = Vec::new();
                    run_session(client, agent, "hello\n".as_bytes(), &mut out, interrupt)
                        .await?;
                    Ok::<_, AgentError>(out)
                })
            })
            .await
            .expect("session");

        assert_eq!(output, b"\n");
        let events = log.lock().expect("log lock").events.clone();
        assert_eq!(
            events,
            vec![
                "open_stream",
                "request:initialize",
                "notify:notifications/initialized",
                "end_session",
                "close_stream"
            ]
        );
        drop(notify);
    }

    #[tokio::test]
    async fn interrupt_while_waiting_for_input_closes_session() {
        let transport = ScriptedTransport::new().reply("tools/list", json!({"tools": []}));
        let log = transport.log();
        let (notify, interrupt) = watch::channel(false);
        let agent = agent();
        let (console, keyboard) = tokio::io::duplex(64);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            notify.send_replace(true);
        });
        let output = McpClient::new(transport.boxed())
            .scoped(move |client| {
                Box::pin(async move {
                    let _keyboard = keyboard;
                    let input = tokio::io::BufReader::new(console);
                    let mut out = Vec::new();
                    run_session(client, agent, input, &mut out, interrupt).await?;
                    Ok::<_, AgentError>(out)
                })
            })
            .await
            .expect("session");

        let text = String::from_utf8(output).expect("utf8");
        assert!(text.contains("Starting console chat. Type 'exit' to quit."));
        assert!(text.ends_with("You: \n"));
        let events = log.lock().expect("log lock").events.clone();
        assert_eq!(events[events.len() - 2..], ["end_session", "close_stream"]);
    }

    #[test]
    fn args_map_onto_overrides() {
        let args = Args::try_parse_from([
            "mcp-agent",
            "--server-url",
            "http://localhost:9000/mcp",
            "--api",
            "dial",
            "-m",
            "gpt-4o-mini",
            "--max-tool-rounds",
            "3",
            "--log",
            "chat.log",
        ])
        .expect("args should parse");

        let overrides = args.overrides();
        assert_eq!(
            overrides.server_url.as_deref(),
            Some("http://localhost:9000/mcp")
        );
        assert_eq!(overrides.api, Some(ApiFlavor::Dial));
        assert_eq!(overrides.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(overrides.max_tool_rounds, Some(3));
        assert_eq!(overrides.transcript, Some(PathBuf::from("chat.log")));
        assert_eq!(overrides.base_url, None);
    }

    #[test]
    fn unknown_api_flavor_is_rejected() {
        assert!(Args::try_parse_from(["mcp-agent", "--api", "azure"]).is_err());
    }

    #[test]
    fn catalog_lists_resources_then_tools() {
        let resources: Vec<Resource> = serde_json::from_value(json!([
            {
                "uri": "users://schema",
                "name": "User schema",
                "description": "Fields of a user record"
            },
            {"uri": "users://stats", "name": "Stats"}
        ]))
        .expect("resources");
        let tools = vec![
            ToolDescriptor::function("get_user", "Fetch a user by id", json!({"type": "object"})),
            ToolDescriptor::function("ping", "", json!({"type": "object"})),
        ];
        let mut out = Vec::new();

        print_catalog(&resources, &tools, &mut out).expect("print");

        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "Available MCP Resources:\n\
             - User schema (Fields of a user record)\n\
             - Stats (users://stats)\n\
             \n\
             Available MCP Tools:\n\
             - get_user (Fetch a user by id)\n\
             - ping\n"
        );
    }
}
