use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use log::{info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::PathBuf;

/// Persisted authentication session for the REST gateway.
///
/// The token is a bearer JWT issued by the server at login. Absence of a
/// session is a normal state: the gateway simply omits the Authorization
/// header and lets the server respond with 401 where auth is required.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Session {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Session {
    pub fn new(token: &str) -> Self {
        Session {
            token: token.to_string(),
            username: None,
        }
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Extract the `sub` claim from the JWT payload segment.
    ///
    /// The server identifies the sender from the token, and the client
    /// needs the same identity to derive room ids locally. Returns None
    /// for tokens that do not look like a JWT.
    pub fn sender_id(&self) -> Option<String> {
        let payload = self.token.split('.').nth(1)?;
        let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
        claims.get("sub").and_then(|v| v.as_str()).map(String::from)
    }
}

static SESSION_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Override the session file location. Intended for tests.
pub fn set_session_path_override(path: PathBuf) -> Result<()> {
    SESSION_PATH_OVERRIDE
        .set(path)
        .map_err(|_| anyhow!("Session path override already set"))
}

fn get_session_path() -> Result<PathBuf> {
    if let Some(path) = SESSION_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("chatpulse");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir.join("session.json"))
}

pub fn save_session(session: &Session) -> Result<()> {
    let path = get_session_path()?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, session)?;

    info!(
        "Session saved for {}",
        session.username.as_deref().unwrap_or("<unknown user>")
    );
    Ok(())
}

pub fn load_session() -> Result<Option<Session>> {
    let path = get_session_path()?;

    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)?;
    let session: Session = serde_json::from_str(&contents)?;
    info!("Loaded session from {}", path.display());

    Ok(Some(session))
}

/// Remove the persisted session. Called by the gateway on a 401 response.
pub fn clear_session() -> Result<()> {
    let path = get_session_path()?;
    if path.exists() {
        fs::remove_file(&path)?;
        warn!("Cleared persisted session after auth failure");
    }
    Ok(())
}
