use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::history;

fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_api_host() -> String {
    "127.0.0.1".to_string()
}
fn default_api_port() -> u16 {
    5000
}
fn default_api_max_json_body_bytes() -> usize {
    8 * 1024
}
fn default_history_file_name() -> String {
    "torrent_history.json".to_string()
}
fn default_history_max_entries() -> usize {
    history::DEFAULT_MAX_ENTRIES
}
fn default_history_page_size() -> usize {
    history::DEFAULT_PAGE_SIZE
}
fn default_content_dir() -> String {
    "content".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub api: ApiConfig,
    pub history: HistoryConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// `PORT` replaces `api.port` when it holds a valid port number.
    pub fn apply_env_overrides(&mut self) {
        let port = std::env::var("PORT").ok();
        self.apply_port_override(port.as_deref());
    }

    pub(crate) fn apply_port_override(&mut self, raw: Option<&str>) {
        let Some(raw) = raw else {
            return;
        };
        match raw.trim().parse::<u16>() {
            Ok(port) => self.api.port = port,
            Err(_) => tracing::warn!(value = %raw, "ignoring invalid PORT override"),
        }
    }

    pub fn history_path(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir).join(&self.history.file_name)
    }

    pub fn content_dir(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir).join(&self.engine.content_dir)
    }

    pub fn lock_path(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir).join("magnet-stream.lock")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Base URL handed to external players in `vlcUrl`. Defaults to
    /// `http://localhost:<port>`.
    pub public_base_url: Option<String>,
    pub max_json_body_bytes: usize,
    /// Browser origins allowed in addition to loopback ones and the origin of
    /// `public_base_url`. Other origins get 403, including same-origin POSTs
    /// from a UI served on a LAN address that is not listed here.
    pub cors_allowed_origins: Vec<String>,
}

impl ApiConfig {
    pub fn public_base_url(&self) -> String {
        match self.public_base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("http://localhost:{}", self.port),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub file_name: String,
    pub max_entries: usize,
    pub default_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding one `<info-hash>/` folder per resource, relative to
    /// `general.data_dir`.
    pub content_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            public_base_url: None,
            max_json_body_bytes: default_api_max_json_body_bytes(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            file_name: default_history_file_name(),
            max_entries: default_history_max_entries(),
            default_page_size: default_history_page_size(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
        }
    }
}

pub fn init_tracing(config: &Config) {
    // RUST_LOG wins over general.log_level, e.g.
    // RUST_LOG=info,magnet_stream=debug

    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.general.log_level.clone());

    let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .init();
}
