use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use netdocs_client::NdClient;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};

use crate::extract::ExtractorSet;
use crate::settings::Settings;

#[derive(Clone)]
pub struct AppContext {
    pub client: Arc<NdClient>,
    pub settings: Arc<Settings>,
    pub extractors: Arc<ExtractorSet>,
    pub state: Arc<ServerState>,
    pub tools: Arc<ToolRegistry>,
}

impl AppContext {
    pub fn new(client: NdClient, settings: Settings) -> Self {
        let extractors = Arc::new(ExtractorSet::new(settings.enable_docx));
        Self {
            client: Arc::new(client),
            settings: Arc::new(settings),
            extractors,
            state: Arc::new(ServerState::default()),
            tools: Arc::new(ToolRegistry::default()),
        }
    }

    pub async fn record_telemetry(&self, entry: TelemetryEntry) {
        let mut guard = self.state.telemetry_log.lock().await;
        guard.push(entry);
        const MAX_ENTRIES: usize = 200;
        if guard.len() > MAX_ENTRIES {
            let overflow = guard.len() - MAX_ENTRIES;
            guard.drain(0..overflow);
        }
    }

    pub async fn telemetry_snapshot(&self) -> Vec<TelemetryEntry> {
        self.state.telemetry_log.lock().await.clone()
    }

    pub async fn record_search(&self, entry: SearchQueryLog) {
        let mut guard = self.state.recent_queries.lock().await;
        guard.push(entry);
        const MAX_QUERIES: usize = 50;
        if guard.len() > MAX_QUERIES {
            let overflow = guard.len() - MAX_QUERIES;
            guard.drain(0..overflow);
        }
    }

    pub async fn recent_searches(&self) -> Vec<SearchQueryLog> {
        self.state.recent_queries.lock().await.clone()
    }
}

#[derive(Default)]
pub struct ServerState {
    pub telemetry_log: Mutex<Vec<TelemetryEntry>>,
    pub recent_queries: Mutex<Vec<SearchQueryLog>>,
}

#[derive(Clone, Serialize)]
pub struct SearchQueryLog {
    pub cabinet: Option<String>,
    pub query: String,
    pub matches: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Clone, Serialize)]
pub struct TelemetryEntry {
    pub tool: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub content: Vec<ToolContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolContent {
    pub r#type: String,
    pub text: String,
}

pub type ToolFuture = BoxFuture<'static, anyhow::Result<ToolResponse>>;
pub type ToolHandler = Arc<dyn Fn(Arc<AppContext>, serde_json::Value) -> ToolFuture + Send + Sync>;

#[derive(Clone)]
pub struct ToolEntry {
    pub definition: ToolDefinition,
    pub handler: ToolHandler,
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    inner: Arc<RwLock<HashMap<String, ToolEntry>>>,
}

impl ToolRegistry {
    pub async fn insert(&self, entry: ToolEntry) {
        self.inner
            .write()
            .await
            .insert(entry.definition.name.clone(), entry);
    }

    pub async fn get(&self, name: &str) -> Option<ToolEntry> {
        self.inner.read().await.get(name).cloned()
    }

    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .inner
            .read()
            .await
            .values()
            .map(|entry| entry.definition.clone())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }
}

impl ToolResponse {
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
