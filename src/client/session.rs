use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ClientError;
use crate::models::user::UserProfile;

/// What a successful login leaves behind on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token from `/api/auth/login`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Key from `/api/auth/direct-login`, used by the emergency routes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_key: Option<String>,
    pub user: UserProfile,
}

/// JSON file holding the current [`Session`]. One file per session key.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/mediscan/<key>.json`, or `~/.mediscan/<key>.json` when
    /// the platform has no config directory.
    #[must_use]
    pub fn for_key(key: &str) -> Self {
        let dir = dirs::config_dir()
            .map(|d| d.join("mediscan"))
            .or_else(|| dirs::home_dir().map(|h| h.join(".mediscan")))
            .unwrap_or_else(|| PathBuf::from("."));

        Self::new(dir.join(format!("{key}.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file is treated as logged out.
    pub fn load(&self) -> Option<Session> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Ignoring corrupt session file");
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ClientError::Session(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(session).map_err(|e| ClientError::Session(e.to_string()))?;
        std::fs::write(&self.path, content).map_err(|e| ClientError::Session(e.to_string()))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Session(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    fn temp_store() -> SessionStore {
        SessionStore::new(
            std::env::temp_dir()
                .join(format!("mediscan-session-{}", uuid::Uuid::new_v4()))
                .join("session.json"),
        )
    }

    fn session() -> Session {
        Session {
            token: Some("jwt".to_string()),
            emergency_key: None,
            user: UserProfile {
                id: 1,
                name: "Test".to_string(),
                email: "test@gmail.com".to_string(),
                role: Role::User,
                created_at: "2026-03-01T00:00:00Z".to_string(),
            },
        }
    }

    #[test]
    fn test_save_load_clear() {
        let store = temp_store();
        assert!(store.load().is_none());

        store.save(&session()).unwrap();
        assert_eq!(store.load(), Some(session()));

        store.clear().unwrap();
        assert!(store.load().is_none());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_file_reads_as_logged_out() {
        let store = temp_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_for_key_uses_key_as_file_stem() {
        let store = SessionStore::for_key("custom_key");
        assert_eq!(
            store.path().file_name().and_then(|n| n.to_str()),
            Some("custom_key.json")
        );
    }
}
