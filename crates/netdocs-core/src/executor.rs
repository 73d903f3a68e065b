use std::{sync::Arc, time::Instant};

use netdocs_client::ClientError;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::state::{AppContext, TelemetryEntry, ToolDefinition, ToolResponse};

/// Coarse failure category, derived from the underlying client error so the
/// transport can map failures onto distinct JSON-RPC codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
    NotFound,
    Upstream,
    Internal,
}

impl FailureKind {
    pub fn of(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<ClientError>() {
            Some(ClientError::Auth(_)) => Self::Auth,
            Some(ClientError::NotFound(_)) => Self::NotFound,
            Some(ClientError::Upstream { .. } | ClientError::Transport(_)) => Self::Upstream,
            Some(ClientError::CorruptState(_)) | None => Self::Internal,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Auth => -32001,
            Self::Upstream => -32002,
            Self::NotFound => -32004,
            Self::Internal => -32000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::Upstream => "upstream",
            Self::Internal => "internal",
        }
    }
}

#[derive(Clone)]
pub struct ToolExecutor {
    context: Arc<AppContext>,
    options: ExecutorOptions,
}

#[derive(Clone)]
struct ExecutorOptions {
    record_telemetry: bool,
}

#[derive(Clone)]
pub struct ToolExecutorBuilder {
    context: Arc<AppContext>,
    options: ExecutorOptions,
}

impl ToolExecutorBuilder {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self {
            context,
            options: ExecutorOptions {
                record_telemetry: true,
            },
        }
    }

    #[must_use]
    pub fn record_telemetry(mut self, enabled: bool) -> Self {
        self.options.record_telemetry = enabled;
        self
    }

    pub fn build(self) -> ToolExecutor {
        ToolExecutor {
            context: self.context,
            options: self.options,
        }
    }
}

impl ToolExecutor {
    pub fn builder(context: Arc<AppContext>) -> ToolExecutorBuilder {
        ToolExecutorBuilder::new(context)
    }

    pub fn context(&self) -> Arc<AppContext> {
        self.context.clone()
    }

    pub async fn list_tools(&self) -> Vec<ToolDefinition> {
        self.context.tools.definitions().await
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolResponse, ToolExecutorError> {
        let Some(entry) = self.context.tools.get(name).await else {
            return Err(ToolExecutorError::UnknownTool(name.to_string()));
        };

        let handler = entry.handler.clone();
        let started = Instant::now();
        match handler(self.context.clone(), arguments).await {
            Ok(response) => {
                if self.options.record_telemetry {
                    self.record_success(name, started.elapsed().as_millis() as u64, &response)
                        .await;
                }
                Ok(response)
            }
            Err(source) => {
                let kind = FailureKind::of(&source);
                if self.options.record_telemetry {
                    self.record_failure(
                        name,
                        started.elapsed().as_millis() as u64,
                        kind,
                        source.to_string(),
                    )
                    .await;
                }
                Err(ToolExecutorError::Execution {
                    name: name.to_string(),
                    kind,
                    source,
                })
            }
        }
    }

    async fn record_success(&self, name: &str, latency_ms: u64, response: &ToolResponse) {
        let metadata = response.metadata.clone();
        let entry = TelemetryEntry {
            tool: name.to_string(),
            timestamp: OffsetDateTime::now_utc(),
            latency_ms,
            success: true,
            metadata: metadata.clone(),
            error: None,
        };
        self.context.record_telemetry(entry).await;
        info!(
            target: "netdocs_executor",
            tool = %name,
            latency_ms,
            success = true,
            metadata = metadata
                .as_ref()
                .map(|value| value.to_string())
                .unwrap_or_else(|| "null".to_string()),
            "tool completed"
        );
    }

    async fn record_failure(&self, name: &str, latency_ms: u64, kind: FailureKind, message: String) {
        let entry = TelemetryEntry {
            tool: name.to_string(),
            timestamp: OffsetDateTime::now_utc(),
            latency_ms,
            success: false,
            metadata: None,
            error: Some(message.clone()),
        };
        self.context.record_telemetry(entry).await;
        warn!(
            target: "netdocs_executor",
            tool = %name,
            latency_ms,
            kind = kind.as_str(),
            error = %message,
            "tool failed"
        );
    }
}

#[derive(Debug, Error)]
pub enum ToolExecutorError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool `{name}` failed ({}): {source}", kind.as_str())]
    Execution {
        name: String,
        kind: FailureKind,
        #[source]
        source: anyhow::Error,
    },
}
