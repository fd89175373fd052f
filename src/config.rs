use anyhow::{anyhow, Context, Result};
use jsonc_parser::{parse_to_serde_value, ParseOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "pattern-sense";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Overrides the embedded system instruction document.
    #[serde(default)]
    pub system_prompt_path: Option<String>,

    /// Overrides where history is stored.
    #[serde(default)]
    pub history_dir: Option<String>,

    #[serde(default)]
    pub auto_copy_clipboard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

fn default_model() -> String {
    // Alias the provider resolves to its current stable Flash model.
    "gemini-flash-latest".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    8192
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Config,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Loads `config.jsonc` from the platform config directory, writing the
    /// defaults there on first run.
    pub fn load() -> Result<Self> {
        let config_dir = project_dirs()?.config_dir().to_path_buf();
        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        Self::load_from(config_dir.join("config.jsonc"))
    }

    pub fn load_from(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();

        let config = if config_path.exists() {
            Self::read_config_from_disk(&config_path)?
        } else {
            let default_config = Config::default();
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            Self::write_config_file(&config_path, &default_config)?;
            tracing::info!("Created default config at: {:?}", config_path);
            default_config
        };

        tracing::debug!("Loaded config from: {:?}", config_path);

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn system_prompt_path(&self) -> Option<PathBuf> {
        self.config
            .system_prompt_path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .map(|path| self.resolve_relative(path))
    }

    /// Directory holding the persisted history.
    pub fn history_dir(&self) -> Result<PathBuf> {
        match self
            .config
            .history_dir
            .as_deref()
            .filter(|dir| !dir.trim().is_empty())
        {
            Some(dir) => Ok(self.resolve_relative(dir)),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }

    fn resolve_relative(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            return path;
        }
        self.config_path
            .parent()
            .map(|dir| dir.join(&path))
            .unwrap_or(path)
    }

    fn read_config_from_disk(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {:?}", path))?;
        parse_config(&content)
    }

    fn write_config_file(path: &Path, config: &Config) -> Result<()> {
        let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config file at {:?}", path))
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_DIR_NAME).context("Failed to get config directory")
}

pub fn parse_config(content: &str) -> Result<Config> {
    let value = parse_to_serde_value(content, &ParseOptions::default())
        .context("Failed to parse config as JSONC")?
        .ok_or_else(|| anyhow!("Config file did not contain a JSON value"))?;
    serde_json::from_value(value).context("Failed to deserialize config")
}
