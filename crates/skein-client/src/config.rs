use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use skein_http::DEFAULT_USER_AGENT;
use skein_sync::SyncConfig;

use crate::error::{ClientError, ClientResult};

pub const DEFAULT_SERVER: &str = "https://srv1-prod.polycentric.io";

/// Client settings, read from TOML.
///
/// ```toml
/// servers = ["https://srv1-prod.polycentric.io"]
/// state_path = "skein-state.json"
///
/// [sync]
/// timeout_ms = 25000
/// replica_timeout_ms = 10000
/// cache_ttl_secs = 86400
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Replicas used until the persisted server list says otherwise.
    pub servers: Vec<String>,
    pub state_path: PathBuf,
    pub user_agent: String,
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: vec![DEFAULT_SERVER.to_string()],
            state_path: PathBuf::from("skein-state.json"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            sync: SyncConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> ClientResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> ClientResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(text: &str) -> ClientResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))?;
        if config.servers.is_empty() {
            return Err(ClientError::Config("at least one server is required".into()));
        }
        Ok(config)
    }
}
