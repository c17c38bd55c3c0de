//! Token storage keyed per user
//!
//! Each user has at most one [`CredentialRecord`] on file; saves are
//! whole-record replacements. The file store keeps one JSON file per user
//! under the token directory (0600 on Unix), the in-memory store backs
//! tests and ephemeral hosting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::credentials::CredentialRecord;
use crate::error::Error;
use crate::Result;

/// Per-user credential persistence
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the record for a user; `Ok(None)` when none exists
    async fn load(&self, user_id: &str) -> Result<Option<CredentialRecord>>;

    /// Replace the record for a user (upsert)
    async fn save(&self, user_id: &str, record: &CredentialRecord) -> Result<()>;

    /// Remove the record for a user; a no-op when none exists
    async fn delete(&self, user_id: &str) -> Result<()>;
}

/// File-backed token store — one JSON file per user id
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, user_id: &str) -> Result<PathBuf> {
        // User ids become file names, so reject anything path-like
        if user_id.is_empty()
            || user_id.contains('/')
            || user_id.contains('\\')
            || user_id.contains("..")
        {
            return Err(Error::Storage(format!("invalid user id: {user_id:?}")));
        }
        Ok(self.dir.join(format!("{user_id}.json")))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self, user_id: &str) -> Result<Option<CredentialRecord>> {
        let path = self.path_for(user_id)?;

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Storage(format!("failed to read {}: {e}", path.display())))?;
        let record: CredentialRecord = serde_json::from_str(&content)
            .map_err(|e| Error::Storage(format!("failed to parse {}: {e}", path.display())))?;

        tracing::debug!("loaded credential record for user {}", user_id);
        Ok(Some(record))
    }

    async fn save(&self, user_id: &str, record: &CredentialRecord) -> Result<()> {
        let path = self.path_for(user_id)?;

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Storage(format!("failed to create {}: {e}", self.dir.display())))?;

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| Error::Storage(format!("failed to serialize record: {e}")))?;
        std::fs::write(&path, content)
            .map_err(|e| Error::Storage(format!("failed to write {}: {e}", path.display())))?;

        set_file_permissions_0600(&path)?;

        tracing::debug!("stored credential record for user {}", user_id);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        let path = self.path_for(user_id)?;
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| Error::Storage(format!("failed to delete {}: {e}", path.display())))?;
        }
        Ok(())
    }
}

/// Set a file's permissions to 0600 on Unix; no-op elsewhere
#[cfg(unix)]
fn set_file_permissions_0600(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)
        .map_err(|e| Error::Storage(format!("failed to chmod {}: {e}", path.display())))
}

#[cfg(not(unix))]
fn set_file_permissions_0600(_path: &Path) -> Result<()> {
    Ok(())
}

/// In-memory token store
#[derive(Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self, user_id: &str) -> Result<Option<CredentialRecord>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, record: &CredentialRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(user_id.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        self.records.write().await.remove(user_id);
        Ok(())
    }
}
