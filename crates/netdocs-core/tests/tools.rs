use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use netdocs_client::{Credentials, NdClient, TokenStore, DEFAULT_PROFILE};
use netdocs_core::settings::Settings;
use netdocs_core::state::AppContext;
use netdocs_core::tools::register_tools;
use netdocs_core::{FailureKind, ToolExecutor, ToolExecutorError};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn executor_for(server: &MockServer, dir: &TempDir, settings: Option<Settings>) -> ToolExecutor {
    let token_path = dir.path().join("tokens.json");
    let store = TokenStore::new(&token_path);
    store
        .save(
            DEFAULT_PROFILE,
            &Credentials {
                access_token: "valid".into(),
                refresh_token: Some("refresh".into()),
                expires_at: None,
                scope: Some("read".into()),
            },
        )
        .await
        .unwrap();

    let mut settings = settings.unwrap_or_default();
    settings.api_base = server.uri();
    settings.token_url = format!("{}/OAuth", server.uri());
    settings.token_path = token_path;
    settings.client_id = "app-id".into();
    settings.client_secret = "app-secret".into();

    let client = NdClient::with_config(settings.client_config());
    let context = Arc::new(AppContext::new(client, settings));
    register_tools(context.clone()).await;
    ToolExecutor::builder(context).build()
}

fn payload_of(response: &netdocs_core::state::ToolResponse) -> Value {
    serde_json::from_str(&response.content[0].text).unwrap()
}

#[tokio::test]
async fn search_scopes_to_explicit_cabinet() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/Search/NG-123"))
        .and(query_param("$top", "25"))
        .and(query_param("$orderby", "lastMod desc"))
        .and(query_param("$select", "standardAttributes"))
        .and(query_param("q", "merger agreement"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "id": "4937-1",
                "name": "Merger Agreement",
                "extension": "docx",
                "description": "Execution copy",
                "url": "https://vault.example.com/doc/4937-1"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server, &dir, None).await;
    let response = executor
        .call_tool(
            "search",
            json!({"query": "cabinetId:NG-123 merger agreement top:25 orderby:lastMod"}),
        )
        .await
        .unwrap();

    let payload = payload_of(&response);
    let results = payload["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], "4937-1");
    assert_eq!(results[0]["title"], "Merger Agreement.docx");
    assert_eq!(results[0]["text"], "Execution copy");
}

#[tokio::test]
async fn search_without_cabinet_uses_first_user_cabinet() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/User/cabinets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"cabinetId": "NG-FIRST", "name": "Primary"},
            {"id": "NG-SECOND", "name": "Archive"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Search/NG-FIRST"))
        .and(query_param("q", "invoice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server, &dir, None).await;
    let response = executor
        .call_tool("search", json!({"query": "invoice"}))
        .await
        .unwrap();

    let payload = payload_of(&response);
    assert!(payload["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn search_falls_back_to_cross_cabinet_when_listing_fails() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/User/cabinets"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Search"))
        .and(query_param("q", "invoice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server, &dir, None).await;
    let response = executor
        .call_tool("search", json!({"query": "invoice"}))
        .await
        .unwrap();
    assert!(payload_of(&response)["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn fetch_returns_extracted_text_and_metadata() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/Document/doc-1/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "notes",
            "extension": "txt",
            "url": "https://vault.example.com/doc/doc-1",
            "cabinetId": "NG-123",
            "size": 21
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Document/doc-1"))
        .and(query_param("base64", "true"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(STANDARD.encode("meeting notes, final")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server, &dir, None).await;
    let response = executor
        .call_tool("fetch", json!({"id": "doc-1"}))
        .await
        .unwrap();

    let payload = payload_of(&response);
    assert_eq!(payload["id"], "doc-1");
    assert_eq!(payload["title"], "notes.txt");
    assert_eq!(payload["text"], "meeting notes, final");
    assert_eq!(payload["url"], "https://vault.example.com/doc/doc-1");
    assert_eq!(payload["metadata"]["content_type"], "text/plain");
    assert_eq!(payload["metadata"]["extraction_status"], "ok");
    assert_eq!(payload["metadata"]["truncated"], false);
    assert_eq!(payload["metadata"]["cabinet_id"], "NG-123");
}

fn pdf_fixture(text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

#[tokio::test]
async fn fetch_extracts_text_from_a_pdf_document() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/Document/doc-pdf/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Side Letter",
            "extension": "pdf"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Document/doc-pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(STANDARD.encode(pdf_fixture("Side letter, fully executed"))),
        )
        .mount(&server)
        .await;

    let executor = executor_for(&server, &dir, None).await;
    let response = executor
        .call_tool("fetch", json!({"id": "doc-pdf"}))
        .await
        .unwrap();

    let payload = payload_of(&response);
    assert_eq!(payload["title"], "Side Letter.pdf");
    assert!(payload["text"]
        .as_str()
        .unwrap()
        .contains("Side letter, fully executed"));
    assert_eq!(payload["metadata"]["content_type"], "application/pdf");
    assert_eq!(payload["metadata"]["extraction_status"], "ok");
    assert_eq!(payload["metadata"]["truncated"], false);
}

#[tokio::test]
async fn fetch_truncates_to_a_pure_prefix() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/Document/doc-2/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "long.txt"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Document/doc-2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(STANDARD.encode("Hello world")),
        )
        .mount(&server)
        .await;

    let settings = Settings {
        max_fetch_chars: 5,
        ..Settings::default()
    };
    let executor = executor_for(&server, &dir, Some(settings)).await;
    let response = executor
        .call_tool("fetch", json!({"id": "doc-2"}))
        .await
        .unwrap();

    let payload = payload_of(&response);
    assert_eq!(payload["text"], "Hello");
    assert_eq!(payload["metadata"]["truncated"], true);
}

#[tokio::test]
async fn fetch_unknown_binary_reports_unsupported() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let junk: Vec<u8> = (0u8..=255).cycle().take(1024).collect();
    Mock::given(method("GET"))
        .and(path("/Document/doc-3/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "blob",
            "extension": "bin"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Document/doc-3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STANDARD.encode(&junk)))
        .mount(&server)
        .await;

    let executor = executor_for(&server, &dir, None).await;
    let response = executor
        .call_tool("fetch", json!({"id": "doc-3"}))
        .await
        .unwrap();

    let payload = payload_of(&response);
    assert_eq!(payload["text"], "");
    assert_eq!(payload["metadata"]["extraction_status"], "unsupported");
    assert_eq!(payload["title"], "blob.bin");
}

#[tokio::test]
async fn fetch_missing_document_is_a_not_found_failure() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/Document/missing/info"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let executor = executor_for(&server, &dir, None).await;
    let error = executor
        .call_tool("fetch", json!({"id": "missing"}))
        .await
        .unwrap_err();
    match error {
        ToolExecutorError::Execution { kind, .. } => assert_eq!(kind, FailureKind::NotFound),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn telemetry_records_searches_and_failures() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/Search/NG-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Document/gone/info"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let executor = executor_for(&server, &dir, None).await;
    executor
        .call_tool("search", json!({"query": "cabinetId:NG-1 deal"}))
        .await
        .unwrap();
    let _ = executor.call_tool("fetch", json!({"id": "gone"})).await;

    let entries = executor.context().telemetry_snapshot().await;
    assert_eq!(entries.len(), 2);
    assert!(entries[0].success);
    assert!(!entries[1].success);

    let searches = executor.context().recent_searches().await;
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].cabinet.as_deref(), Some("NG-1"));
    assert_eq!(searches[0].matches, 0);
}
