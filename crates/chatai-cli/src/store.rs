//! Persisted bearer token and active chat id.
//!
//! Both values are opaque strings. They are read here and handed to the
//! client per call; the client never looks them up itself.

use anyhow::{Context, Result};
use chatai_client::Credentials;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::paths;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chat_id: Option<String>,
}

#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    data: StoredCredentials,
}

impl CredentialStore {
    pub fn open_default() -> Result<Self> {
        Self::open(paths::credentials_path()?)
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid credentials file {}", path.display()))?
        } else {
            StoredCredentials::default()
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> Option<&str> {
        self.data.token.as_deref()
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.data.chat_id.as_deref()
    }

    /// Snapshot of the stored values for one call.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.data.token.clone(), self.data.chat_id.clone())
    }

    pub fn set_token(&mut self, token: Option<String>) -> Result<()> {
        self.data.token = token;
        self.save()
    }

    pub fn set_chat_id(&mut self, chat_id: Option<String>) -> Result<()> {
        self.data.chat_id = chat_id;
        self.save()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.data = StoredCredentials::default();
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.data)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        // `mode` only applies on creation; tighten a file that already existed.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}
