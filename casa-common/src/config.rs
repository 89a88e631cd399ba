//! Configuration loading and root folder resolution
//!
//! One TOML file configures both collectors. Every value has a built-in
//! default except the ones a collector cannot run without (the forum client
//! identifier, the chat bridge address); those are checked by
//! [`TomlConfig::validate_forum`] and [`TomlConfig::validate_chat`].
//!
//! # Root folder priority
//!
//! 1. Command-line argument (`--root-folder`)
//! 2. Environment variable (`CASA_ROOT_FOLDER`)
//! 3. TOML `root_folder`
//! 4. OS-dependent default data directory

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CASA_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "casa.db";

/// Chat session state file name inside the root folder
pub const CHAT_SESSION_FILE: &str = "chat-session.json";

/// Upstream maximum for one forum listing request
pub const FORUM_MAX_BATCH: u32 = 100;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding the database and session state (optional)
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub forum: ForumConfig,
    pub chat: ChatConfig,
    pub store: StoreConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Forum (pull) collector configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForumConfig {
    /// Base URL of the forum API
    pub base_url: String,
    /// Channels (subreddits) polled each run, in this order
    pub channels: Vec<String>,
    /// Channel label allow-list, empty monitors everything
    pub allow_list: Vec<String>,
    /// Items requested per channel, clamped to [`FORUM_MAX_BATCH`]
    pub batch_size: u32,
    /// Politeness delay between consecutive channels
    pub channel_delay_ms: u64,
    /// Descriptive client identifier sent with every request
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.reddit.com".to_string(),
            channels: Vec::new(),
            allow_list: Vec::new(),
            batch_size: 25,
            channel_delay_ms: 2000,
            user_agent: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl ForumConfig {
    /// Batch size after clamping to the upstream maximum
    pub fn effective_batch_size(&self) -> u32 {
        self.batch_size.min(FORUM_MAX_BATCH)
    }

    pub fn channel_delay(&self) -> Duration {
        Duration::from_millis(self.channel_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Chat (push) collector configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Address of the local chat-network bridge (host:port)
    pub bridge_addr: String,
    /// Group label allow-list, empty monitors everything
    pub allow_list: Vec<String>,
    /// Messages shorter than this (in characters) are discarded
    pub min_body_chars: usize,
    /// Number of ingestion workers
    pub workers: usize,
    /// Capacity of the queue between the session and the workers
    pub queue_capacity: usize,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bridge_addr: String::new(),
            allow_list: Vec::new(),
            min_body_chars: 10,
            workers: 4,
            queue_capacity: 256,
            backoff_initial_ms: 1000,
            backoff_max_ms: 60_000,
        }
    }
}

/// Dedup store connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub max_connections: u32,
    /// SQLite busy_timeout applied to every connection
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout_ms: 5000,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration
    ///
    /// An explicitly requested file must exist. When no path is given the
    /// platform default location is tried and built-in defaults are used if
    /// there is no file there.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    tracing::debug!("No config file found, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check the settings the forum collector cannot run without
    pub fn validate_forum(&self) -> Result<()> {
        if self.forum.user_agent.trim().is_empty() {
            return Err(Error::Config(
                "forum.user_agent is required: upstream usage policy demands a descriptive \
                 client identifier (e.g. \"casa-collector/0.1 (by u/your_account)\")"
                    .to_string(),
            ));
        }
        if self.forum.base_url.trim().is_empty() {
            return Err(Error::Config("forum.base_url must not be empty".to_string()));
        }
        if self.forum.channels.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::Config("forum.channels contains a blank entry".to_string()));
        }
        Ok(())
    }

    /// Check the settings the chat collector cannot run without
    pub fn validate_chat(&self) -> Result<()> {
        if self.chat.bridge_addr.trim().is_empty() {
            return Err(Error::Config(
                "chat.bridge_addr is required (address of the chat bridge, host:port)".to_string(),
            ));
        }
        if self.chat.workers == 0 {
            return Err(Error::Config("chat.workers must be at least 1".to_string()));
        }
        if self.chat.queue_capacity == 0 {
            return Err(Error::Config("chat.queue_capacity must be at least 1".to_string()));
        }
        if self.chat.backoff_initial_ms == 0 || self.chat.backoff_max_ms < self.chat.backoff_initial_ms {
            return Err(Error::Config(
                "chat.backoff_initial_ms must be > 0 and <= chat.backoff_max_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the root folder (CLI → ENV → TOML → OS default)
    pub fn resolve_root_folder(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.root_folder {
            return path.clone();
        }

        default_root_folder()
    }
}

/// Path of the database inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// Path of the persisted chat session inside a root folder
pub fn chat_session_path(root_folder: &Path) -> PathBuf {
    root_folder.join(CHAT_SESSION_FILE)
}

/// Default configuration file location for the platform
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("casa").join("config.toml"))
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("casa"))
        .unwrap_or_else(|| PathBuf::from("./casa_data"))
}
