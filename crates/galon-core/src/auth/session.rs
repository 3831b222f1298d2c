use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::token::{Claims, User};

/// Session file name in the session directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub user: User,
    pub saved_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(access_token: String, user: User) -> Self {
        Self {
            access_token,
            user,
            saved_at: Utc::now(),
        }
    }

    /// Valid means the stored token still decodes and has not expired.
    pub fn is_valid(&self) -> bool {
        Claims::decode(&self.access_token)
            .map(|claims| !claims.is_expired())
            .unwrap_or(false)
    }
}

/// Locally persisted login.
///
/// With no directory the session only lives in memory.
pub struct Session {
    dir: Option<PathBuf>,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir: Some(dir),
            data: None,
        }
    }

    pub fn in_memory() -> Self {
        Self { dir: None, data: None }
    }

    /// Load session from disk.
    ///
    /// Returns `Ok(true)` when a usable session was found. A stored session
    /// whose token is invalid or expired is deleted.
    pub fn load(&mut self) -> Result<bool> {
        let Some(path) = self.session_path() else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }

        let contents = std::fs::read_to_string(&path)
            .context("Failed to read session file")?;
        let parsed: Result<SessionData, _> = serde_json::from_str(&contents);

        match parsed {
            Ok(data) if data.is_valid() => {
                debug!(user = %data.user.username, "Restored persisted session");
                self.data = Some(data);
                Ok(true)
            }
            _ => {
                debug!("Discarding unusable persisted session");
                self.clear()?;
                Ok(false)
            }
        }
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let (Some(data), Some(path)) = (&self.data, self.session_path()) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create session directory")?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents).context("Failed to write session file")?;
        }
        Ok(())
    }

    /// Clear session data in memory and on disk
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        if let Some(path) = self.session_path() {
            if path.exists() {
                std::fs::remove_file(path).context("Failed to remove session file")?;
            }
        }
        Ok(())
    }

    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.access_token.as_str())
    }

    fn session_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(SESSION_FILE))
    }
}
