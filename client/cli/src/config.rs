use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::session::{Session, User};

pub const DEFAULT_SYNC_BATCH_SIZE: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server_url: Option<String>,
    pub token: Option<String>,
    /// Destination folder used by `upload` when none is given.
    pub upload_folder: Option<String>,
    pub sync_batch_size: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    // Kept last: TOML tables must follow plain values.
    pub user: Option<User>,
}

impl Config {
    pub fn config_path() -> anyhow::Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "docsearch", "docsearch")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };
        if let Ok(server) = std::env::var("DOCSEARCH_SERVER") {
            if !server.trim().is_empty() {
                config.server_url = Some(server);
            }
        }
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn require_server(&self) -> anyhow::Result<&str> {
        self.server_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No server configured. Run: docsearch login --server <url>"))
    }

    pub fn require_auth(&self) -> anyhow::Result<()> {
        if self.token.is_none() {
            anyhow::bail!("Not logged in. Run: docsearch login");
        }
        Ok(())
    }

    /// The persisted session, if both halves are present.
    pub fn session(&self) -> Option<Session> {
        match (&self.token, &self.user) {
            (Some(token), Some(user)) => Some(Session {
                token: token.clone(),
                user: user.clone(),
            }),
            _ => None,
        }
    }

    pub fn set_session(&mut self, session: Option<&Session>) {
        self.token = session.map(|s| s.token.clone());
        self.user = session.map(|s| s.user.clone());
    }

    pub fn sync_batch_size(&self) -> u32 {
        self.sync_batch_size
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_SYNC_BATCH_SIZE)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[test]
    fn test_session_round_trips_through_toml() {
        let mut config = Config {
            server_url: Some("http://docs.local:8000".into()),
            ..Default::default()
        };
        config.set_session(Some(&Session {
            token: "abc".into(),
            user: User {
                username: "ana".into(),
                display_name: "Ana Q".into(),
                role: Role::Admin,
            },
        }));
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        let session = back.session().unwrap();
        assert_eq!(session.token, "abc");
        assert_eq!(session.user.role, Role::Admin);
        assert!(back.require_auth().is_ok());
    }

    #[test]
    fn test_cleared_session_requires_login() {
        let mut config = Config::default();
        config.token = Some("abc".into());
        config.set_session(None);
        assert!(config.session().is_none());
        assert!(config.require_auth().is_err());
    }

    #[test]
    fn test_batch_size_default_and_zero() {
        let mut config = Config::default();
        assert_eq!(config.sync_batch_size(), DEFAULT_SYNC_BATCH_SIZE);
        config.sync_batch_size = Some(0);
        assert_eq!(config.sync_batch_size(), DEFAULT_SYNC_BATCH_SIZE);
        config.sync_batch_size = Some(200);
        assert_eq!(config.sync_batch_size(), 200);
    }
}
