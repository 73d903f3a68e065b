use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::state::{AppContext, ToolContent, ToolEntry, ToolHandler, ToolResponse};

pub mod fetch;
pub mod search;

pub use fetch::definition as fetch_definition;
pub use search::definition as search_definition;

pub async fn register_tools(context: Arc<AppContext>) {
    for (definition, handler) in [search::definition(), fetch::definition()] {
        context
            .tools
            .insert(ToolEntry {
                definition,
                handler,
            })
            .await;
    }
}

pub(crate) fn wrap_handler<F, Fut>(handler: F) -> ToolHandler
where
    F: Fn(Arc<AppContext>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResponse>> + Send + 'static,
{
    Arc::new(move |context, value| Box::pin(handler(context, value)))
}

pub(crate) fn parse_args<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).context("invalid tool arguments")
}

/// Single text content block holding a pretty-printed JSON payload.
pub(crate) fn json_response(payload: &Value) -> ToolResponse {
    let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    ToolResponse {
        content: vec![ToolContent {
            r#type: "text".to_string(),
            text,
        }],
        metadata: None,
    }
}
