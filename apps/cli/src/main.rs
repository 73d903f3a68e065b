use std::{fs, io::Write as _};

use anyhow::{anyhow, bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use indicatif::ProgressBar;
use netdocs_client::{build_authorize_url, generate_state, PkceChallenge};
use netdocs_core::settings::Settings;
use netdocs_core::{bootstrap, ServerConfig, ServerMode, ToolExecutor, ToolExecutorError};
use output::{OutputFormat, Renderer};
use progress::spinner;
use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "netdocs",
    version,
    about = "Interact with the NetDocuments MCP tooling from the shell."
)]
struct Cli {
    /// Preferred renderer for command output.
    #[arg(long, global = true, value_enum, default_value = "markdown")]
    format: OutputFormat,
    /// Disable ANSI colors in CLI output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Suppress non-critical CLI output.
    #[arg(long, global = true)]
    quiet: bool,
    /// Disable progress indicators for long-running tasks.
    #[arg(long, global = true)]
    no_progress: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, Clone)]
enum Command {
    /// Run the MCP server over STDIO (JSON-RPC transport).
    Serve,
    /// Inspect and invoke available tools.
    Tools {
        #[command(subcommand)]
        command: ToolCommand,
    },
    /// Manage stored NetDocuments credentials.
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    /// View recent tool telemetry captured by the server.
    Telemetry {
        /// Maximum number of telemetry entries to display (0 = all).
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand, Clone)]
enum ToolCommand {
    /// List registered tools and their descriptions.
    List,
    /// Execute a tool by name with optional JSON arguments.
    Call {
        name: String,
        /// Tool arguments expressed as JSON (`{"key": "value"}`) or @path to a JSON file.
        #[arg(short, long)]
        arguments: Option<String>,
    },
}

#[derive(Debug, Subcommand, Clone)]
enum AuthCommand {
    /// Run the browser-based authorization-code flow and store the tokens.
    Login,
    /// Show whether stored credentials exist and when they expire.
    Status,
    /// Remove stored credentials for the active profile.
    Logout,
}

#[derive(Clone, Debug, Serialize)]
struct AuthStatusReport {
    profile: String,
    token_path: String,
    authorized: bool,
    has_refresh_token: bool,
    expires_at: Option<String>,
    expired: bool,
}

impl Cli {
    fn progress_enabled(&self) -> bool {
        !self.quiet && !self.no_progress
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    if cli.no_color {
        std::env::set_var("NO_COLOR", "1");
    }

    if matches!(cli.command, Command::Serve) {
        return netdocs_mcp::run_server().await;
    }
    if let Command::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "netdocs", &mut std::io::stdout());
        return Ok(());
    }

    let config = ServerConfig {
        settings: Settings::load()?,
        mode: ServerMode::Headless,
        ..ServerConfig::default()
    };
    let runtime = bootstrap(config).await?;
    let executor = runtime.executor();
    let renderer = Renderer::new(cli.format);

    match &cli.command {
        Command::Serve | Command::Completions { .. } => unreachable!("handled above"),
        Command::Tools { command } => {
            handle_tool_command(command.clone(), &cli, &renderer, executor).await
        }
        Command::Auth { command } => {
            handle_auth_command(command.clone(), &cli, &renderer, executor).await
        }
        Command::Telemetry { limit } => {
            handle_telemetry_command(*limit, &cli, &renderer, executor).await
        }
    }
}

async fn handle_tool_command(
    command: ToolCommand,
    cli: &Cli,
    renderer: &Renderer,
    executor: ToolExecutor,
) -> Result<()> {
    match command {
        ToolCommand::List => {
            let definitions = executor.list_tools().await;
            if cli.quiet {
                return Ok(());
            }
            renderer.tool_definitions(&definitions)?;
        }
        ToolCommand::Call { name, arguments } => {
            let payload = parse_arguments(arguments)?;
            let spinner = spinner(cli.progress_enabled(), format!("Calling `{name}`..."));
            let result = executor.call_tool(&name, payload).await;
            match result {
                Ok(response) => {
                    finish_spinner(spinner, Some(format!("Tool `{name}` completed")));
                    if !cli.quiet {
                        renderer.tool_response(&response)?;
                    }
                }
                Err(ToolExecutorError::UnknownTool(_)) => {
                    finish_spinner(spinner, None);
                    bail!("unknown tool: {name}");
                }
                Err(ToolExecutorError::Execution { source, .. }) => {
                    finish_spinner(spinner, None);
                    return Err(source.context(format!("tool `{name}` failed")));
                }
            }
        }
    }

    Ok(())
}

async fn handle_auth_command(
    command: AuthCommand,
    cli: &Cli,
    renderer: &Renderer,
    executor: ToolExecutor,
) -> Result<()> {
    let context = executor.context();
    let client = context.client.clone();
    match command {
        AuthCommand::Login => {
            let oauth_config = client.oauth().config();
            if oauth_config.client_id.is_empty() || oauth_config.client_secret.is_empty() {
                bail!(
                    "NETDOCS_CLIENT_ID and NETDOCS_CLIENT_SECRET must be configured before login"
                );
            }

            let pkce = PkceChallenge::generate();
            let state = generate_state();
            let url = build_authorize_url(oauth_config, &state, &pkce.challenge);

            println!("Open this URL in a browser and authorize the application:");
            println!();
            println!("  {url}");
            println!();
            let reply = prompt("Paste the full redirect URL (or just the code parameter): ")?;
            let (code, returned_state) = parse_redirect_reply(&reply)?;
            if let Some(returned) = returned_state {
                if returned != state {
                    bail!("state mismatch in redirect; aborting login");
                }
            }

            let spinner = spinner(cli.progress_enabled(), "Exchanging authorization code...");
            let result = client.oauth().exchange_code(&code, &pkce.verifier).await;
            let credentials = match result {
                Ok(credentials) => {
                    finish_spinner(spinner, Some("Authorization complete".to_string()));
                    credentials
                }
                Err(error) => {
                    finish_spinner(spinner, None);
                    return Err(anyhow::Error::from(error).context("authorization code exchange failed"));
                }
            };
            client.store_credentials(&credentials).await?;
            tracing::info!(
                target: "netdocs_cli",
                profile = %client.profile(),
                "credentials stored"
            );

            if !cli.quiet {
                match credentials.expires_at {
                    Some(at) => println!(
                        "Credentials stored for profile `{}` (expires {}).",
                        client.profile(),
                        at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
                    ),
                    None => println!("Credentials stored for profile `{}`.", client.profile()),
                }
            }
        }
        AuthCommand::Status => {
            let credentials = client.token_store().load(client.profile()).await?;
            if cli.quiet {
                return Ok(());
            }
            let report = match credentials {
                Some(credentials) => AuthStatusReport {
                    profile: client.profile().to_string(),
                    token_path: client.token_store().path().display().to_string(),
                    authorized: true,
                    has_refresh_token: credentials.refresh_token.is_some(),
                    expires_at: credentials.expires_at.map(|at| {
                        at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
                    }),
                    expired: credentials.expires_within(time::Duration::ZERO),
                },
                None => AuthStatusReport {
                    profile: client.profile().to_string(),
                    token_path: client.token_store().path().display().to_string(),
                    authorized: false,
                    has_refresh_token: false,
                    expires_at: None,
                    expired: false,
                },
            };
            renderer.auth_status(&report)?;
        }
        AuthCommand::Logout => {
            let removed = client.token_store().clear(client.profile()).await?;
            if cli.quiet {
                return Ok(());
            }
            if removed {
                println!("Credentials removed for profile `{}`.", client.profile());
            } else {
                println!("No stored credentials for profile `{}`.", client.profile());
            }
        }
    }
    Ok(())
}

async fn handle_telemetry_command(
    limit: usize,
    cli: &Cli,
    renderer: &Renderer,
    executor: ToolExecutor,
) -> Result<()> {
    if cli.quiet {
        return Ok(());
    }

    let context = executor.context();
    let entries = context.telemetry_snapshot().await;
    if entries.is_empty() {
        renderer.no_telemetry()?;
        return Ok(());
    }

    let total = entries.len();
    let start = if limit == 0 {
        0
    } else {
        total.saturating_sub(limit)
    };
    let sliced: Vec<_> = entries.into_iter().skip(start).collect();
    renderer.telemetry(&sliced)?;
    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,netdocs_cli=info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .without_time()
        .with_ansi(!cli.no_color)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))
}

fn parse_arguments(arguments: Option<String>) -> Result<Value> {
    match arguments {
        Some(raw) if raw.starts_with('@') => {
            let path = raw.trim_start_matches('@');
            let contents =
                fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("invalid JSON arguments in {path}"))
        }
        Some(raw) => serde_json::from_str(&raw).context("invalid JSON arguments"),
        None => Ok(Value::Object(Default::default())),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut reply = String::new();
    std::io::stdin()
        .read_line(&mut reply)
        .context("failed to read from stdin")?;
    let reply = reply.trim().to_string();
    if reply.is_empty() {
        bail!("no input provided");
    }
    Ok(reply)
}

/// Accepts either a pasted redirect URL or a bare authorization code.
/// Returns the code plus the `state` parameter when one was present.
fn parse_redirect_reply(reply: &str) -> Result<(String, Option<String>)> {
    if !reply.contains('=') {
        return Ok((reply.to_string(), None));
    }
    let query = reply.split_once('?').map_or(reply, |(_, query)| query);
    let mut code = None;
    let mut state = None;
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(value)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| value.to_string());
        match key {
            "code" => code = Some(value),
            "state" => state = Some(value),
            _ => {}
        }
    }
    match code {
        Some(code) => Ok((code, state)),
        None => bail!("redirect URL does not contain a `code` parameter"),
    }
}

fn finish_spinner(spinner: Option<ProgressBar>, message: Option<String>) {
    if let Some(progress) = spinner {
        if let Some(msg) = message {
            progress.finish_with_message(msg);
        } else {
            progress.finish_and_clear();
        }
    }
}

mod output {
    use anyhow::Result;
    use clap::ValueEnum;
    use netdocs_core::state::{TelemetryEntry, ToolDefinition, ToolResponse};
    use serde_json::{self, json};

    #[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
    pub enum OutputFormat {
        Json,
        Markdown,
        Text,
    }

    #[derive(Copy, Clone, Debug)]
    pub struct Renderer {
        format: OutputFormat,
    }

    impl Renderer {
        pub fn new(format: OutputFormat) -> Self {
            Self { format }
        }

        pub fn tool_definitions(&self, definitions: &[ToolDefinition]) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    let payload = json!({ "tools": definitions });
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                }
                OutputFormat::Markdown => {
                    println!("| Tool | Description |");
                    println!("| --- | --- |");
                    for entry in definitions {
                        println!("| `{}` | {} |", entry.name, sanitize(&entry.description));
                    }
                }
                OutputFormat::Text => {
                    for entry in definitions {
                        println!("{}: {}", entry.name, sanitize(&entry.description));
                    }
                }
            }
            Ok(())
        }

        pub fn tool_response(&self, response: &ToolResponse) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(response)?);
                }
                OutputFormat::Markdown | OutputFormat::Text => {
                    for content in &response.content {
                        println!("{}", content.text.trim());
                        println!();
                    }
                    if let Some(metadata) = &response.metadata {
                        println!("```json");
                        println!("{}", serde_json::to_string_pretty(metadata)?);
                        println!("```");
                    }
                }
            }
            Ok(())
        }

        pub fn telemetry(&self, entries: &[TelemetryEntry]) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(entries)?);
                }
                OutputFormat::Markdown => {
                    println!("| Timestamp | Tool | Latency (ms) | Success |");
                    println!("| --- | --- | ---: | --- |");
                    for entry in entries {
                        println!(
                            "| {} | `{}` | {} | {} |",
                            entry.timestamp, entry.tool, entry.latency_ms, entry.success
                        );
                    }
                }
                OutputFormat::Text => {
                    for entry in entries {
                        println!(
                            "[{}] {} took {} ms ({})",
                            entry.timestamp,
                            entry.tool,
                            entry.latency_ms,
                            if entry.success { "success" } else { "error" }
                        );
                        if let Some(error) = &entry.error {
                            println!("  error: {error}");
                        }
                    }
                }
            }
            Ok(())
        }

        pub fn auth_status(&self, report: &crate::AuthStatusReport) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(report)?);
                }
                OutputFormat::Markdown => {
                    println!("| Property | Value |");
                    println!("| --- | --- |");
                    println!("| Profile | `{}` |", report.profile);
                    println!("| Token file | `{}` |", report.token_path);
                    println!("| Authorized | {} |", report.authorized);
                    println!("| Refresh token | {} |", report.has_refresh_token);
                    println!(
                        "| Expires | {} |",
                        report.expires_at.as_deref().unwrap_or("n/a")
                    );
                    println!("| Expired | {} |", report.expired);
                }
                OutputFormat::Text => {
                    println!("Profile: {}", report.profile);
                    println!("Token file: {}", report.token_path);
                    println!("Authorized: {}", report.authorized);
                    println!("Refresh token stored: {}", report.has_refresh_token);
                    println!(
                        "Expires: {}",
                        report.expires_at.as_deref().unwrap_or("n/a")
                    );
                    println!("Expired: {}", report.expired);
                }
            }
            Ok(())
        }

        pub fn no_telemetry(&self) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&Vec::<TelemetryEntry>::new())?
                    );
                }
                OutputFormat::Markdown | OutputFormat::Text => {
                    println!("No telemetry entries recorded yet.");
                }
            }
            Ok(())
        }
    }

    fn sanitize(value: &str) -> String {
        value
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

mod progress {
    use std::time::Duration;

    use indicatif::{ProgressBar, ProgressStyle};

    pub fn spinner(message_enabled: bool, message: impl Into<String>) -> Option<ProgressBar> {
        if !message_enabled {
            return None;
        }
        let progress = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        progress.set_style(style);
        progress.set_message(message.into());
        progress.enable_steady_tick(Duration::from_millis(80));
        Some(progress)
    }
}
