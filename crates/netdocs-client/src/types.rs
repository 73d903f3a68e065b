use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Persisted OAuth material for one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Credentials {
    /// True when the access token expires within `leeway` of now. Tokens
    /// without an expiry never report as expiring.
    pub fn expires_within(&self, leeway: Duration) -> bool {
        match self.expires_at {
            Some(at) => at <= OffsetDateTime::now_utc() + leeway,
            None => false,
        }
    }
}

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Converts `expires_in` into an absolute instant. When the provider
    /// omits a rotated refresh token the previous one is carried forward.
    pub fn into_credentials(self, previous_refresh: Option<String>) -> Credentials {
        Credentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self
                .expires_in
                .map(|secs| OffsetDateTime::now_utc() + Duration::seconds(secs)),
            scope: self.scope,
        }
    }
}

/// One cabinet from `GET /User/cabinets`. Tenants disagree on the id field
/// name, so both spellings are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct Cabinet {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "cabinetId")]
    pub cabinet_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Cabinet {
    pub fn identifier(&self) -> Option<&str> {
        self.id.as_deref().or(self.cabinet_id.as_deref())
    }
}

/// Metadata from `GET /Document/{id}/info`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentInfo {
    #[serde(default, alias = "filename")]
    pub name: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "cabinetId")]
    pub cabinet_id: Option<String>,
    #[serde(default, rename = "repositoryId")]
    pub repository_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl DocumentInfo {
    /// Display name for the document, with the extension appended when the
    /// provider reports one that the name does not already carry.
    pub fn display_name(&self, id: &str) -> String {
        let base = match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("document-{id}"),
        };
        match self.extension.as_deref() {
            Some(ext) if !ext.is_empty() => {
                let suffix = format!(".{}", ext.to_ascii_lowercase());
                if base.to_ascii_lowercase().ends_with(&suffix) {
                    base
                } else {
                    format!("{base}{suffix}")
                }
            }
            _ => base,
        }
    }
}
