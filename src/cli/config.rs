use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
const SESSION_FILE: &str = "session.json";

/// Persisted CLI state: which server to talk to and the current login
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub server_url: String,
    pub token: Option<String>,
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            token: None,
            email: None,
            expires_at: None,
        }
    }
}

impl Session {
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let file = dir.join(SESSION_FILE);
        if !file.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(file)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(dir)?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(SESSION_FILE), content)?;
        Ok(())
    }

    pub fn login(&mut self, token: String, email: String, expires_in: i64) {
        self.token = Some(token);
        self.email = Some(email);
        self.expires_at = Some(Utc::now() + chrono::Duration::seconds(expires_in));
    }

    pub fn logout(&mut self) {
        self.token = None;
        self.email = None;
        self.expires_at = None;
    }

    /// Token, unless it has expired
    pub fn active_token(&self) -> Option<&str> {
        match self.expires_at {
            Some(expiry) if expiry <= Utc::now() => None,
            _ => self.token.as_deref(),
        }
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(custom_dir) = std::env::var("DYNAVO_CLI_CONFIG_DIR") {
        return Ok(PathBuf::from(custom_dir));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
    Ok(PathBuf::from(home).join(".config").join("dynavo").join("cli"))
}

pub fn load_session() -> anyhow::Result<Session> {
    Session::load_from(&get_config_dir()?)
}

pub fn save_session(session: &Session) -> anyhow::Result<()> {
    session.save_to(&get_config_dir()?)
}
