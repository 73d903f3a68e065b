use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::types::{Credentials, TokenResponse};
use crate::ClientError;

/// Provider endpoints and application credentials for the
/// authorization-code flow.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub authorize_url: String,
    pub token_url: String,
}

/// PKCE verifier plus its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = Self::challenge_for(&verifier);
        Self { verifier, challenge }
    }

    pub fn challenge_for(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

/// Opaque value tying the authorization redirect back to this login attempt.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Builds the browser URL for the authorization step.
pub fn build_authorize_url(config: &OAuthConfig, state: &str, challenge: &str) -> String {
    format!(
        "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
        config.authorize_url,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(&config.scope),
        urlencoding::encode(state),
        urlencoding::encode(challenge),
    )
}

/// Token-endpoint client. NetDocuments expects the application credentials
/// via HTTP Basic on every token request.
pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, config: OAuthConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Exchanges an authorization code for credentials.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<Credentials, ClientError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", verifier),
        ];
        debug!(target: "netdocs_client", "exchanging authorization code");
        self.token_request(&params, None).await
    }

    /// Trades a refresh token for a new access token. The previous refresh
    /// token is kept when the provider does not rotate it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credentials, ClientError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        debug!(target: "netdocs_client", "refreshing access token");
        self.token_request(&params, Some(refresh_token.to_string()))
            .await
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        previous_refresh: Option<String>,
    ) -> Result<Credentials, ClientError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|error| ClientError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ClientError::Auth(format!(
                "token endpoint returned {status}: {}",
                crate::truncate_detail(&detail)
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|error| ClientError::Transport(error.to_string()))?;
        Ok(token.into_credentials(previous_refresh))
    }
}
