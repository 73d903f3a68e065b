use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::debug;

use crate::types::Credentials;
use crate::ClientError;

/// Profile used when no explicit profile is configured.
pub const DEFAULT_PROFILE: &str = "default";

/// JSON-file credential store keyed by profile name. All mutation happens
/// under an internal lock so concurrent refreshes cannot interleave a
/// read-modify-write.
pub struct TokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self, profile: &str) -> Result<Option<Credentials>, ClientError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        Ok(all.remove(profile))
    }

    pub async fn save(&self, profile: &str, credentials: &Credentials) -> Result<(), ClientError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        all.insert(profile.to_string(), credentials.clone());
        self.write_all(&all).await?;
        debug!(target: "netdocs_client", profile, path = %self.path.display(), "credentials saved");
        Ok(())
    }

    pub async fn clear(&self, profile: &str) -> Result<bool, ClientError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        let removed = all.remove(profile).is_some();
        if removed {
            self.write_all(&all).await?;
        }
        Ok(removed)
    }

    async fn read_all(&self) -> Result<BTreeMap<String, Credentials>, ClientError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(error) => {
                return Err(ClientError::CorruptState(format!(
                    "unable to read {}: {error}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_slice(&raw).map_err(|error| {
            ClientError::CorruptState(format!(
                "credential file {} is not valid JSON: {error}",
                self.path.display()
            ))
        })
    }

    async fn write_all(&self, all: &BTreeMap<String, Credentials>) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                ClientError::CorruptState(format!(
                    "unable to create {}: {error}",
                    parent.display()
                ))
            })?;
        }
        let raw = serde_json::to_vec_pretty(all).map_err(|error| {
            ClientError::CorruptState(format!("unable to serialize credentials: {error}"))
        })?;
        tokio::fs::write(&self.path, raw).await.map_err(|error| {
            ClientError::CorruptState(format!(
                "unable to write {}: {error}",
                self.path.display()
            ))
        })
    }
}
