//! `search` tool: query mini-language in, normalized result list out.

use std::sync::Arc;

use anyhow::Result;
use netdocs_client::{Cabinet, SearchRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::debug;

use crate::query;
use crate::state::{AppContext, SearchQueryLog, ToolDefinition, ToolHandler, ToolResponse};
use crate::tools::{json_response, parse_args, wrap_handler};

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResultItem {
    pub id: String,
    pub title: String,
    pub text: String,
    pub url: String,
}

pub fn definition() -> (ToolDefinition, ToolHandler) {
    let definition = ToolDefinition {
        name: "search".to_string(),
        description: concat!(
            "Search NetDocuments. The query accepts structured prefixes ",
            "`cabinetId:<id>`, `top:<1-500>`, `orderby:<relevance|lastMod>` and ",
            "`select:<fields>`; all remaining words are matched as full text. ",
            "Example: `cabinetId:NG-123 merger agreement top:25`."
        )
        .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query, optionally with structured prefixes"
                }
            },
            "required": ["query"]
        }),
    };
    (definition, wrap_handler(handle))
}

async fn handle(context: Arc<AppContext>, value: Value) -> Result<ToolResponse> {
    let args: SearchArgs = parse_args(value)?;
    let parsed = query::parse(&args.query, context.settings.query_defaults());

    let cabinet_id = match parsed.cabinet_id.clone() {
        Some(id) => Some(id),
        None => first_cabinet(&context).await,
    };

    let request = SearchRequest {
        cabinet_id: cabinet_id.clone(),
        full_text: parsed.full_text.clone(),
        top: parsed.top,
        order_by: parsed.order_by.as_param().to_string(),
        select: parsed.select_param(),
    };
    let payload = context.client.search(&request).await?;
    let results = shape_results(&payload, parsed.top as usize);

    context
        .record_search(SearchQueryLog {
            cabinet: cabinet_id,
            query: args.query.clone(),
            matches: results.len(),
            timestamp: OffsetDateTime::now_utc(),
        })
        .await;

    let count = results.len();
    Ok(json_response(&json!({ "results": results }))
        .with_metadata(json!({ "matches": count })))
}

/// Without an explicit cabinet the user's first cabinet scopes the search;
/// when even that fails the search runs across all cabinets.
async fn first_cabinet(context: &AppContext) -> Option<String> {
    match context.client.user_cabinets().await {
        Ok(cabinets) => cabinets
            .iter()
            .find_map(Cabinet::identifier)
            .map(str::to_string),
        Err(error) => {
            debug!(
                target: "netdocs_core",
                %error,
                "cabinet lookup failed; searching across all cabinets"
            );
            None
        }
    }
}

/// Normalizes the provider's tenant-dependent payload into flat result
/// items. Field names vary between deployments, so several spellings are
/// probed for each output field.
fn shape_results(payload: &Value, top: usize) -> Vec<SearchResultItem> {
    let items = payload
        .as_array()
        .or_else(|| payload.get("results").and_then(Value::as_array))
        .or_else(|| payload.get("items").and_then(Value::as_array))
        .or_else(|| payload.get("standardList").and_then(Value::as_array));
    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .take(top)
        .enumerate()
        .map(|(index, item)| {
            let id = first_field(item, &["id", "documentId", "docId", "_id"])
                .unwrap_or_else(|| index.to_string());
            let name = first_field(item, &["name", "title", "filename"])
                .unwrap_or_else(|| format!("Document {}", index + 1));
            let extension = first_field(item, &["extension", "fileExtension"]).unwrap_or_default();
            let title = if extension.is_empty()
                || name
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", extension.to_ascii_lowercase()))
            {
                name
            } else {
                format!("{name}.{extension}")
            };
            let text = first_field(item, &["description", "summary"])
                .unwrap_or_else(|| "No preview available".to_string());
            let url = first_field(item, &["url", "href"]).unwrap_or_default();
            SearchResultItem { id, title, text, url }
        })
        .collect()
}

fn first_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
