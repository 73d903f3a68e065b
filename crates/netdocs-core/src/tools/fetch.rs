//! `fetch` tool: document id in, extracted text plus metadata out.

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::state::{AppContext, ToolDefinition, ToolHandler, ToolResponse};
use crate::tools::{json_response, parse_args, wrap_handler};

#[derive(Debug, Deserialize)]
struct FetchArgs {
    id: String,
}

pub fn definition() -> (ToolDefinition, ToolHandler) {
    let definition = ToolDefinition {
        name: "fetch".to_string(),
        description: concat!(
            "Fetch a NetDocuments document by id and return its extracted ",
            "text content together with document metadata. PDF, DOCX and ",
            "plain-text documents are extracted; other types are returned ",
            "as metadata only."
        )
        .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "id": {
                    "type": "string",
                    "description": "NetDocuments document id"
                }
            },
            "required": ["id"]
        }),
    };
    (definition, wrap_handler(handle))
}

async fn handle(context: Arc<AppContext>, value: Value) -> Result<ToolResponse> {
    let args: FetchArgs = parse_args(value)?;

    let info = context.client.document_info(&args.id).await?;
    let data = context.client.download_document(&args.id).await?;
    let file_name = info.display_name(&args.id);

    let extraction = context.extractors.extract(&file_name, &data);
    let (text, truncated) = truncate_chars(extraction.text, context.settings.max_fetch_chars);
    debug!(
        target: "netdocs_core",
        id = %args.id,
        bytes = data.len(),
        chars = text.chars().count(),
        truncated,
        status = ?extraction.status,
        "document fetched"
    );

    let payload = json!({
        "id": args.id,
        "title": file_name,
        "text": text,
        "url": info.url.clone().unwrap_or_default(),
        "metadata": {
            "content_type": extraction.content_type,
            "extraction_status": extraction.status,
            "truncated": truncated,
            "extension": info.extension,
            "cabinet_id": info.cabinet_id,
            "repository_id": info.repository_id,
            "size": info.size,
        }
    });
    Ok(json_response(&payload).with_metadata(json!({
        "extraction_status": extraction.status,
        "truncated": truncated,
    })))
}

/// Cuts to at most `budget` characters on a valid char boundary. The result
/// is always a pure prefix of the input.
fn truncate_chars(text: String, budget: usize) -> (String, bool) {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => {
            let mut text = text;
            text.truncate(cut);
            (text, true)
        }
        None => (text, false),
    }
}
