use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use netdocs_client::{default_token_path, ClientConfig, OAuthConfig, DEFAULT_PROFILE};
use serde::Deserialize;

use crate::query::{OrderBy, QueryDefaults};

/// Runtime configuration, layered from an optional `netdocs.toml` file and
/// `NETDOCS_*` environment variables (environment wins).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_base: String,
    pub profile: String,
    pub token_path: PathBuf,
    pub search_default_top: u32,
    pub search_default_order: String,
    pub max_fetch_chars: usize,
    pub enable_docx: bool,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "https://localhost/callback".into(),
            scope: "read".into(),
            authorize_url: "https://vault.netvoyage.com/neWeb2/OAuth.aspx".into(),
            token_url: "https://api.vault.netvoyage.com/v1/OAuth".into(),
            api_base: "https://api.vault.netvoyage.com/v1".into(),
            profile: DEFAULT_PROFILE.into(),
            token_path: default_token_path(),
            search_default_top: 50,
            search_default_order: "relevance".into(),
            max_fetch_chars: 150_000,
            enable_docx: true,
            request_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let raw = config::Config::builder()
            .add_source(config::File::with_name("netdocs").required(false))
            .add_source(config::Environment::with_prefix("NETDOCS"))
            .build()
            .context("unable to assemble configuration sources")?;
        raw.try_deserialize()
            .context("invalid configuration value")
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_base: self.api_base.clone(),
            oauth: OAuthConfig {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                redirect_uri: self.redirect_uri.clone(),
                scope: self.scope.clone(),
                authorize_url: self.authorize_url.clone(),
                token_url: self.token_url.clone(),
            },
            token_path: self.token_path.clone(),
            profile: self.profile.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Defaults applied to fields the query mini-language leaves unset.
    /// An unrecognized configured order falls back to relevance.
    pub fn query_defaults(&self) -> QueryDefaults {
        QueryDefaults {
            top: self.search_default_top,
            order_by: OrderBy::parse(&self.search_default_order).unwrap_or_default(),
        }
    }
}
