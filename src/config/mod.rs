//! TOML configuration, loaded from `~/.roomwarden/config.toml` by default.
//! A commented default file is written on first run. All values are
//! immutable after startup.

use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path this config was loaded from - computed, not serialized.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Classifier backend API key. `GEMINI_API_KEY` is used when unset.
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for the classifier. Kept at 0.0 so verdicts
    /// stay deterministic.
    #[serde(default)]
    pub temperature: f64,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// The one room this process moderates.
    #[serde(default = "default_room_id")]
    pub room_id: String,
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_room_id() -> String {
    "!iYYuXGoKsPtMPlJEub:mozilla.org".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            room_id: default_room_id(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            api_key: None,
            model: default_model(),
            temperature: 0.0,
            gateway: GatewayConfig::default(),
        }
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# roomwarden configuration
# api_key = "..."            # or set GEMINI_API_KEY
model = "gemini-1.5-flash"
temperature = 0.0

[gateway]
base_url = "http://localhost:8080"
room_id = "!iYYuXGoKsPtMPlJEub:mozilla.org"
"#;

impl Config {
    /// Load the config, writing a commented default file first if none
    /// exists at the resolved path.
    pub fn load(path_override: Option<PathBuf>) -> Result<Self> {
        let path = match path_override {
            Some(path) => path,
            None => Self::default_path()?,
        };

        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
                .with_context(|| format!("writing default config to {}", path.display()))?;
            tracing::info!("wrote default config to {}", path.display());
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    fn default_path() -> Result<PathBuf> {
        let dirs = UserDirs::new().context("could not determine home directory")?;
        Ok(dirs.home_dir().join(".roomwarden").join("config.toml"))
    }
}
