use anyhow::Result;
use netdocs_core::settings::Settings;
use netdocs_core::{run, ServerConfig, ServerMode};

const HEADLESS_ENV: &str = "NETDOCS_HEADLESS";

/// Launches the MCP server using environment-informed defaults.
pub async fn run_server() -> Result<()> {
    let config = ServerConfig {
        settings: Settings::load()?,
        mode: resolve_mode(),
        ..ServerConfig::default()
    };

    tracing::info!(
        target: "netdocs_mcp",
        api_base = %config.settings.api_base,
        mode = ?config.mode,
        "Starting MCP server"
    );
    run(config).await
}

fn resolve_mode() -> ServerMode {
    match std::env::var_os(HEADLESS_ENV) {
        Some(value) if value == "1" || value.eq_ignore_ascii_case("true") => ServerMode::Headless,
        _ => ServerMode::Stdio,
    }
}
