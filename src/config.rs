use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_token_address")]
    pub token_address: String,
    #[serde(default = "default_max_lookback_blocks")]
    pub max_lookback_blocks: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    #[serde(default = "default_observer_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub rpc_url: Option<String>,
    pub db_path: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/retrieval-stats/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(rpc_url) = overrides.rpc_url {
            self.ledger.rpc_url = rpc_url;
        }
        if let Some(db_path) = overrides.db_path {
            self.storage.db_path = db_path;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn default_template() -> String {
        let template = r#"[server]
host = "127.0.0.1"
port = 8080

[storage]
db_path = "~/.local/share/retrieval-stats/stats.db"

[ledger]
rpc_url = "https://api.node.glif.io/rpc/v1"
token_address = "0x0000000000000000000000000000000000000000"
max_lookback_blocks = 2880
request_timeout_secs = 12

[observer]
interval_secs = 600
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            token_address: default_token_address(),
            max_lookback_blocks: default_max_lookback_blocks(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_observer_interval_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "~/.local/share/retrieval-stats/stats.db".to_string()
}

fn default_rpc_url() -> String {
    "https://api.node.glif.io/rpc/v1".to_string()
}

fn default_token_address() -> String {
    "0x0000000000000000000000000000000000000000".to_string()
}

fn default_max_lookback_blocks() -> u64 {
    2880
}

fn default_request_timeout_secs() -> u64 {
    12
}

fn default_observer_interval_secs() -> u64 {
    600
}
