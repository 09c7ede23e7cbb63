use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::image::fal::FalConfig;
use crate::services::image::openai::OpenAIImageConfig;
use crate::services::image::replicate::ReplicateConfig;
use crate::services::llm::LlmConfig;
use crate::services::relay::RelayConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_image_provider")]
    pub provider: String, // "openai", "replicate" or "fal"

    /// Pause between two page requests.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub openai: OpenAIImageConfig,
    #[serde(default)]
    pub replicate: ReplicateConfig,
    #[serde(default)]
    pub fal: FalConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_retry_delay")]
    pub delay_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_folder: default_output(),
            credentials_file: default_credentials_file(),
            llm: LlmConfig::default(),
            image: ImageConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            provider: default_image_provider(),
            page_delay_ms: default_page_delay_ms(),
            retry: RetryConfig::default(),
            openai: OpenAIImageConfig::default(),
            replicate: ReplicateConfig::default(),
            fal: FalConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_seconds: default_retry_delay(),
        }
    }
}

fn default_output() -> String {
    "output".to_string()
}
fn default_credentials_file() -> String {
    "credentials.json".to_string()
}
fn default_image_provider() -> String {
    "openai".to_string()
}
fn default_page_delay_ms() -> u64 {
    1000
}
fn default_max_attempts() -> usize {
    3
}
fn default_retry_delay() -> u64 {
    10
}

impl Config {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &str) -> Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            info!("{} not found, using default settings", path.display());
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Like `load`, but writes the defaults to `path` on first run so there is
    /// a file to edit.
    pub fn load_or_create(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            return Self::load(path);
        }
        let config = Config::default();
        config.save(path)?;
        info!("Wrote default settings to {}", path);
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path))?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)?;
        Ok(())
    }
}
