//! Server core: configuration, tool registry, executor and stdio transport
//! for the NetDocuments MCP server.

use std::sync::Arc;

use anyhow::Result;
use netdocs_client::NdClient;
use time::OffsetDateTime;
use tracing::{debug, info};

pub mod executor;
pub mod extract;
pub mod query;
pub mod settings;
pub mod state;
pub mod tools;
pub mod transport;

use settings::Settings;
use state::AppContext;

pub use executor::{FailureKind, ToolExecutor, ToolExecutorBuilder, ToolExecutorError};

/// Configuration inputs required to bootstrap the MCP server core.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub settings: Settings,
    /// Timestamp captured during process initialization for diagnostics.
    pub boot_timestamp: OffsetDateTime,
    /// How the server transports requests/responses.
    pub mode: ServerMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Stdio,
    Headless,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            boot_timestamp: OffsetDateTime::now_utc(),
            mode: ServerMode::Stdio,
        }
    }
}

#[derive(Clone)]
pub struct CoreRuntime {
    config: ServerConfig,
    executor: executor::ToolExecutor,
}

impl CoreRuntime {
    pub fn executor(&self) -> executor::ToolExecutor {
        self.executor.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn serve(&self) -> Result<()> {
        match self.config.mode {
            ServerMode::Stdio => transport::serve_stdio(self.executor.clone()).await?,
            ServerMode::Headless => {
                debug!(target: "netdocs_core", "Headless mode: skipping transport loop");
            }
        }
        Ok(())
    }
}

pub async fn bootstrap(config: ServerConfig) -> Result<CoreRuntime> {
    let client = NdClient::with_config(config.settings.client_config());
    let context = Arc::new(AppContext::new(client, config.settings.clone()));
    tools::register_tools(context.clone()).await;

    debug!(
        target: "netdocs_core",
        token_path = %context.client.token_store().path().display(),
        api_base = %config.settings.api_base,
        "NetDocuments client initialized"
    );

    info!(
        target: "netdocs_core",
        boot_timestamp = %config.boot_timestamp,
        mode = ?config.mode,
        "Core server starting"
    );

    let executor = executor::ToolExecutor::builder(context).build();
    Ok(CoreRuntime { config, executor })
}

pub async fn run(config: ServerConfig) -> Result<()> {
    bootstrap(config).await?.serve().await
}
