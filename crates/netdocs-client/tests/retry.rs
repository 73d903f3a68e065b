use std::time::Duration;

use netdocs_client::{
    ClientConfig, ClientError, Credentials, NdClient, OAuthConfig, TokenStore, DEFAULT_PROFILE,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer, dir: &TempDir) -> ClientConfig {
    ClientConfig {
        api_base: server.uri(),
        oauth: OAuthConfig {
            client_id: "app-id".into(),
            client_secret: "app-secret".into(),
            redirect_uri: "https://localhost/callback".into(),
            scope: "read".into(),
            authorize_url: format!("{}/OAuth.aspx", server.uri()),
            token_url: format!("{}/OAuth", server.uri()),
        },
        token_path: dir.path().join("tokens.json"),
        profile: DEFAULT_PROFILE.into(),
        timeout: Duration::from_secs(5),
    }
}

async fn seed_credentials(dir: &TempDir, access: &str, refresh: Option<&str>) {
    let store = TokenStore::new(dir.path().join("tokens.json"));
    let credentials = Credentials {
        access_token: access.into(),
        refresh_token: refresh.map(str::to_string),
        expires_at: None,
        scope: Some("read".into()),
    };
    store.save(DEFAULT_PROFILE, &credentials).await.unwrap();
}

#[tokio::test]
async fn stale_token_is_refreshed_exactly_once() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_credentials(&dir, "stale", Some("refresh-1")).await;

    Mock::given(method("GET"))
        .and(path("/User/cabinets"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/OAuth"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "refresh_token": "refresh-2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/User/cabinets"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "NG-1", "name": "Main Cabinet"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = NdClient::with_config(test_config(&server, &dir));
    let cabinets = client.user_cabinets().await.unwrap();
    assert_eq!(cabinets.len(), 1);
    assert_eq!(cabinets[0].identifier(), Some("NG-1"));

    let store = TokenStore::new(dir.path().join("tokens.json"));
    let persisted = store.load(DEFAULT_PROFILE).await.unwrap().unwrap();
    assert_eq!(persisted.access_token, "fresh");
    assert_eq!(persisted.refresh_token.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn token_near_expiry_is_refreshed_before_the_first_call() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let store = TokenStore::new(dir.path().join("tokens.json"));
    store
        .save(
            DEFAULT_PROFILE,
            &Credentials {
                access_token: "about-to-expire".into(),
                refresh_token: Some("refresh-1".into()),
                expires_at: Some(time::OffsetDateTime::now_utc() + time::Duration::seconds(10)),
                scope: Some("read".into()),
            },
        )
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/OAuth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/User/cabinets"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = NdClient::with_config(test_config(&server, &dir));
    client.user_cabinets().await.unwrap();
}

#[tokio::test]
async fn second_rejection_stops_after_two_attempts() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_credentials(&dir, "stale", Some("refresh-1")).await;

    Mock::given(method("GET"))
        .and(path("/User/cabinets"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/OAuth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "still-bad",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = NdClient::with_config(test_config(&server, &dir));
    let error = client.user_cabinets().await.unwrap_err();
    assert!(matches!(error, ClientError::Auth(_)), "got {error:?}");
}

#[tokio::test]
async fn missing_refresh_token_fails_without_token_exchange() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_credentials(&dir, "stale", None).await;

    Mock::given(method("GET"))
        .and(path("/User/cabinets"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/OAuth"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = NdClient::with_config(test_config(&server, &dir));
    let error = client.user_cabinets().await.unwrap_err();
    assert!(matches!(error, ClientError::Auth(_)), "got {error:?}");
}

#[tokio::test]
async fn rejected_refresh_surfaces_as_auth_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_credentials(&dir, "stale", Some("revoked")).await;

    Mock::given(method("GET"))
        .and(path("/User/cabinets"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/OAuth"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = NdClient::with_config(test_config(&server, &dir));
    let error = client.user_cabinets().await.unwrap_err();
    assert!(matches!(error, ClientError::Auth(_)), "got {error:?}");
}

#[tokio::test]
async fn not_found_and_upstream_statuses_are_distinguished() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_credentials(&dir, "valid", Some("refresh-1")).await;

    Mock::given(method("GET"))
        .and(path("/Document/missing/info"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Document/broken/info"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = NdClient::with_config(test_config(&server, &dir));

    let missing = client.document_info("missing").await.unwrap_err();
    assert!(matches!(missing, ClientError::NotFound(_)), "got {missing:?}");

    let broken = client.document_info("broken").await.unwrap_err();
    match broken {
        ClientError::Upstream { status, detail } => {
            assert_eq!(status.as_u16(), 502);
            assert_eq!(detail, "bad gateway");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn downloads_decode_base64_and_fall_back_to_raw_bytes() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_credentials(&dir, "valid", Some("refresh-1")).await;

    Mock::given(method("GET"))
        .and(path("/Document/encoded"))
        .respond_with(ResponseTemplate::new(200).set_body_string("aGVsbG8gd29ybGQ="))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Document/raw"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not base64!".to_vec()))
        .mount(&server)
        .await;

    let client = NdClient::with_config(test_config(&server, &dir));

    let encoded = client.download_document("encoded").await.unwrap();
    assert_eq!(encoded, b"hello world");

    let raw = client.download_document("raw").await.unwrap();
    assert_eq!(raw, b"not base64!");
}
