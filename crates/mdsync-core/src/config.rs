//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/mdsync/config.toml)
//! 3. Environment variables (MDSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::document::ConvertMode;
use crate::notion::{NotionSettings, DEFAULT_API_BASE_URL, DEFAULT_NOTION_VERSION};
use crate::reconcile::{PropertyMap, ReconcileOptions, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
use crate::retry::RetryPolicy;

/// Environment variable prefix
const ENV_PREFIX: &str = "MDSYNC";

/// Token variable shared with other Notion tooling
const NOTION_TOKEN_VAR: &str = "NOTION_TOKEN";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the Markdown files
    #[serde(default = "default_notes_dir")]
    pub notes_dir: PathBuf,

    /// Directory for the sync ledger
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Target Notion database
    #[serde(default)]
    pub database_id: Option<String>,

    /// Notion integration token
    #[serde(default)]
    pub notion_token: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_notion_version")]
    pub notion_version: String,

    /// Prepend a title heading and byline to each page
    #[serde(default)]
    pub full_page: bool,

    /// Blocks per create/append call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Send unrecognized front-matter fields as extra properties
    #[serde(default = "default_true")]
    pub pass_through_unknown: bool,

    /// Write logs here instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Quiet period before a watched file is synced
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub properties: PropertyMap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notes_dir: default_notes_dir(),
            data_dir: default_data_dir(),
            database_id: None,
            notion_token: None,
            api_base_url: default_api_base_url(),
            notion_version: default_notion_version(),
            full_page: false,
            batch_size: default_batch_size(),
            pass_through_unknown: true,
            log_file: None,
            watch_debounce_ms: default_watch_debounce_ms(),
            retry: RetryPolicy::default(),
            properties: PropertyMap::default(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (MDSYNC_NOTES_DIR, MDSYNC_DATABASE_ID, ...)
    /// 2. Config file (~/.config/mdsync/config.toml or MDSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from `path` if given, else from the default location
    pub fn load_with_override(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_NOTES_DIR", ENV_PREFIX)) {
            self.notes_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_DATABASE_ID", ENV_PREFIX)) {
            self.database_id = non_empty(val);
        }

        // MDSYNC_NOTION_TOKEN wins over the generic NOTION_TOKEN
        let token = std::env::var(format!("{}_NOTION_TOKEN", ENV_PREFIX))
            .or_else(|_| std::env::var(NOTION_TOKEN_VAR));
        if let Ok(val) = token {
            self.notion_token = non_empty(val);
        }
    }

    /// Check everything a remote run needs is present
    pub fn validate_remote(&self) -> Result<()> {
        if self.notion_token.as_deref().map_or(true, str::is_empty) {
            bail!(
                "No Notion token configured. Set notion_token in {:?} or {}_NOTION_TOKEN",
                Self::config_file_path(),
                ENV_PREFIX
            );
        }
        if self.database_id.as_deref().map_or(true, str::is_empty) {
            bail!(
                "No database configured. Set database_id in {:?} or {}_DATABASE_ID",
                Self::config_file_path(),
                ENV_PREFIX
            );
        }
        if self.properties.title.is_empty() || self.properties.slug.is_empty() {
            bail!("properties.title and properties.slug must name remote fields");
        }
        Ok(())
    }

    /// Connection settings for the Notion client
    pub fn notion_settings(&self) -> Result<NotionSettings> {
        self.validate_remote()?;
        Ok(NotionSettings {
            token: self.notion_token.clone().unwrap_or_default(),
            database_id: self.database_id.clone().unwrap_or_default(),
            base_url: self.api_base_url.clone(),
            version: self.notion_version.clone(),
        })
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            properties: self.properties.clone(),
            batch_size: self.batch_size.clamp(1, MAX_BATCH_SIZE),
            pass_through_unknown: self.pass_through_unknown,
            retry: self.retry,
        }
    }

    pub fn convert_mode(&self) -> ConvertMode {
        if self.full_page {
            ConvertMode::FullPage
        } else {
            ConvertMode::ContentOnly
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with MDSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mdsync")
            .join("config.toml")
    }

    /// Get the path to the sync ledger
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("sync-state.json")
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

fn default_notes_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mdsync")
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_notion_version() -> String {
    DEFAULT_NOTION_VERSION.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

fn default_watch_debounce_ms() -> u64 {
    500
}
