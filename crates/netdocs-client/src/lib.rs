//! Async NetDocuments REST client with on-disk credentials and a
//! single-refresh retry policy for expired access tokens.

use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use directories::ProjectDirs;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub mod oauth;
pub mod token_store;
pub mod types;

pub use oauth::{build_authorize_url, generate_state, OAuthClient, OAuthConfig, PkceChallenge};
pub use token_store::{TokenStore, DEFAULT_PROFILE};
pub use types::{Cabinet, Credentials, DocumentInfo, TokenResponse};

const USER_AGENT: &str = "NetDocsMCP/1.0 (+https://github.com/netdocs-mcp)";
const DETAIL_LIMIT: usize = 400;

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_LEEWAY: time::Duration = time::Duration::seconds(60);

#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing, rejected, or unrefreshable credentials.
    #[error("not authorized: {0}")]
    Auth(String),
    /// The requested resource does not exist upstream.
    #[error("not found: {0}")]
    NotFound(String),
    /// Any other non-success response from the provider.
    #[error("upstream error ({status}): {detail}")]
    Upstream { status: StatusCode, detail: String },
    /// The credential file on disk cannot be read or parsed.
    #[error("credential store error: {0}")]
    CorruptState(String),
    /// Network-level failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Caps provider error bodies so they stay loggable.
pub(crate) fn truncate_detail(detail: &str) -> String {
    let trimmed = detail.trim();
    match trimmed.char_indices().nth(DETAIL_LIMIT) {
        Some((cut, _)) => trimmed[..cut].to_string(),
        None => trimmed.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub oauth: OAuthConfig,
    pub token_path: PathBuf,
    pub profile: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.vault.netvoyage.com/v1".into(),
            oauth: OAuthConfig {
                client_id: String::new(),
                client_secret: String::new(),
                redirect_uri: "https://localhost/callback".into(),
                scope: "read".into(),
                authorize_url: "https://vault.netvoyage.com/neWeb2/OAuth.aspx".into(),
                token_url: "https://api.vault.netvoyage.com/v1/OAuth".into(),
            },
            token_path: default_token_path(),
            profile: DEFAULT_PROFILE.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Default location of the credential file under the platform data dir.
pub fn default_token_path() -> PathBuf {
    ProjectDirs::from("dev", "netdocs", "netdocs-mcp")
        .map(|dirs| dirs.data_dir().join("tokens.json"))
        .unwrap_or_else(|| PathBuf::from("tokens.json"))
}

/// Search parameters already resolved to provider wire values.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub cabinet_id: Option<String>,
    pub full_text: String,
    pub top: u32,
    pub order_by: String,
    pub select: String,
}

enum Attempt {
    Initial,
    RetriedAfterRefresh,
}

pub struct NdClient {
    http: reqwest::Client,
    api_base: String,
    oauth: OAuthClient,
    store: TokenStore,
    profile: String,
    refresh_lock: Mutex<()>,
}

impl NdClient {
    pub fn with_config(config: ClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .unwrap_or_default();
        let oauth = OAuthClient::new(http.clone(), config.oauth);
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            oauth,
            store: TokenStore::new(config.token_path),
            profile: config.profile,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Persists freshly exchanged credentials under this client's profile.
    pub async fn store_credentials(&self, credentials: &Credentials) -> Result<(), ClientError> {
        self.store.save(&self.profile, credentials).await
    }

    /// Cabinets visible to the authenticated user.
    pub async fn user_cabinets(&self) -> Result<Vec<Cabinet>, ClientError> {
        let response = self.request(Method::GET, "/User/cabinets", &[]).await?;
        response
            .json()
            .await
            .map_err(|error| ClientError::Transport(error.to_string()))
    }

    /// Runs a search, scoped to one cabinet when an id is given and across
    /// all cabinets otherwise. The payload shape varies by tenant, so the
    /// raw JSON is returned for the caller to interpret.
    pub async fn search(&self, request: &SearchRequest) -> Result<Value, ClientError> {
        let path = match request.cabinet_id.as_deref() {
            Some(id) => format!("/Search/{id}"),
            None => "/Search".to_string(),
        };
        let query = [
            ("$top", request.top.to_string()),
            ("$orderby", format!("{} desc", request.order_by)),
            ("$select", request.select.clone()),
            ("q", request.full_text.clone()),
        ];
        let response = self.request(Method::GET, &path, &query).await?;
        response
            .json()
            .await
            .map_err(|error| ClientError::Transport(error.to_string()))
    }

    pub async fn document_info(&self, id: &str) -> Result<DocumentInfo, ClientError> {
        let response = self
            .request(Method::GET, &format!("/Document/{id}/info"), &[])
            .await?;
        response
            .json()
            .await
            .map_err(|error| ClientError::Transport(error.to_string()))
    }

    /// Downloads document content. The provider is asked for base64; some
    /// tenants ignore the flag and return raw bytes, so decode failures fall
    /// back to the body as-is.
    pub async fn download_document(&self, id: &str) -> Result<Vec<u8>, ClientError> {
        let query = [("base64", "true".to_string())];
        let response = self
            .request(Method::GET, &format!("/Document/{id}"), &query)
            .await?;
        let body = response
            .bytes()
            .await
            .map_err(|error| ClientError::Transport(error.to_string()))?;
        if let Ok(text) = std::str::from_utf8(&body) {
            if let Ok(decoded) = STANDARD.decode(text.trim()) {
                return Ok(decoded);
            }
        }
        Ok(body.to_vec())
    }

    async fn bearer(&self) -> Result<String, ClientError> {
        match self.store.load(&self.profile).await? {
            Some(credentials)
                if credentials.expires_within(EXPIRY_LEEWAY)
                    && credentials.refresh_token.is_some() =>
            {
                debug!(target: "netdocs_client", "stored token expires soon; refreshing");
                self.refresh_and_persist().await
            }
            Some(credentials) => Ok(credentials.access_token),
            None => Err(ClientError::Auth(
                "no stored credentials; authorize with `netdocs auth login` first".into(),
            )),
        }
    }

    /// Refreshes the stored credentials once, serialized so concurrent 401s
    /// trigger a single token exchange.
    async fn refresh_and_persist(&self) -> Result<String, ClientError> {
        let _guard = self.refresh_lock.lock().await;
        let current = self
            .store
            .load(&self.profile)
            .await?
            .ok_or_else(|| ClientError::Auth("credentials disappeared during refresh".into()))?;
        let Some(refresh_token) = current.refresh_token.clone() else {
            return Err(ClientError::Auth(
                "access token rejected and no refresh token is stored; re-run `netdocs auth login`"
                    .into(),
            ));
        };
        let fresh = self.oauth.refresh(&refresh_token).await?;
        self.store.save(&self.profile, &fresh).await?;
        Ok(fresh.access_token)
    }

    /// Two-attempt request core: a 401 on the first attempt triggers exactly
    /// one refresh-and-retry; a second 401 surfaces as an auth error.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{path}", self.api_base);
        let mut token = self.bearer().await?;
        let mut attempt = Attempt::Initial;
        loop {
            let response = self
                .http
                .request(method.clone(), &url)
                .query(query)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|error| ClientError::Transport(error.to_string()))?;

            if response.status() == StatusCode::UNAUTHORIZED {
                match attempt {
                    Attempt::Initial => {
                        debug!(target: "netdocs_client", path, "access token rejected; refreshing once");
                        token = self.refresh_and_persist().await?;
                        attempt = Attempt::RetriedAfterRefresh;
                        continue;
                    }
                    Attempt::RetriedAfterRefresh => {
                        warn!(target: "netdocs_client", path, "refreshed token rejected as well");
                        return Err(ClientError::Auth(
                            "access token rejected again after refresh".into(),
                        ));
                    }
                }
            }
            return Self::check_status(path, response).await;
        }
    }

    async fn check_status(
        path: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(path.to_string()));
        }
        let detail = response.text().await.unwrap_or_default();
        Err(ClientError::Upstream {
            status,
            detail: truncate_detail(&detail),
        })
    }
}
