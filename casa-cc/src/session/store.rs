//! Persisted session state
//!
//! Saving the provider's session token lets a restarted collector resume
//! without a new pairing challenge.

use std::path::{Path, PathBuf};

use casa_common::Result;

use crate::provider::SessionToken;

/// Session token file in the root folder
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved token
    ///
    /// A missing or unreadable file means "no session": the provider will
    /// present a fresh pairing challenge.
    pub async fn load(&self) -> Option<SessionToken> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Cannot read saved chat session");
                return None;
            }
        };

        match serde_json::from_str::<SessionToken>(&content) {
            Ok(token) if token.0.is_null() => None,
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt saved chat session");
                None
            }
        }
    }

    /// Save the token, replacing the file atomically
    pub async fn save(&self, token: &SessionToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(token)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Forget the saved session (after a remote logout)
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
