// Configuration management for the OCI adapters.
// All services read from one TOML file; credentials are referenced, never stored
// decrypted beyond the key file path/material the host hands us.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    pub auth: AuthConfig,
    pub genai: GenAiConfig,
    pub vector: VectorConfig,
    pub speech: SpeechConfig,
}

/// Identifiers for OCI request signing. The signing provider itself is
/// constructed by the host; we only carry and normalize the material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AuthConfig {
    pub user_id: String,
    pub tenancy_id: String,
    pub key_fingerprint: String,
    /// Path to a PEM private key file. Inline key material may be supplied
    /// programmatically instead; see `auth::Credentials`.
    pub key_file: Option<PathBuf>,
    pub passphrase: Option<String>,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenAiConfig {
    pub region: String,
    pub compartment_id: String,
    pub chat_model: String,
    pub embed_model: String,
    pub embed_batch_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorConfig {
    pub database_url: String,
    pub table: String,
    pub distance_strategy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeechConfig {
    pub region: String,
    pub compartment_id: String,
    pub namespace: String,
    pub bucket: String,
    pub output_prefix: String,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid region: {0} (cannot be empty)")]
    InvalidRegion(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 96)")]
    InvalidBatchSize(u32),
    #[error("Invalid table name: {0} (cannot be empty)")]
    InvalidTable(String),
    #[error("Invalid poll interval: {0}s (must be nonzero)")]
    InvalidPollInterval(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for GenAiConfig {
    #[inline]
    fn default() -> Self {
        Self {
            region: "us-chicago-1".to_string(),
            compartment_id: String::new(),
            chat_model: "cohere.command-r-plus".to_string(),
            embed_model: "cohere.embed-english-v3.0".to_string(),
            embed_batch_size: 90,
        }
    }
}

impl Default for VectorConfig {
    #[inline]
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/oci_bridge".to_string(),
            table: "embeddings".to_string(),
            distance_strategy: "EUCLIDEAN_DISTANCE".to_string(),
        }
    }
}

impl Default for SpeechConfig {
    #[inline]
    fn default() -> Self {
        Self {
            region: "us-chicago-1".to_string(),
            compartment_id: String::new(),
            namespace: String::new(),
            bucket: String::new(),
            output_prefix: "transcriptions".to_string(),
            poll_interval_secs: 5,
            timeout_secs: 1800,
        }
    }
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".oci-bridge"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    #[inline]
    pub fn load() -> Result<Self> {
        let config_path =
            Self::config_file_path().context("Failed to determine config file path")?;
        Self::load_from(&config_path)
    }

    #[inline]
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;

        fs::create_dir_all(&config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        self.save_to(&config_dir.join("config.toml"))
    }

    #[inline]
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.genai.validate()?;
        self.vector.validate()?;
        self.speech.validate()
    }
}

impl GenAiConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::InvalidRegion(self.region.clone()));
        }
        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }
        if self.embed_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embed_model.clone()));
        }
        if self.embed_batch_size == 0 || self.embed_batch_size > 96 {
            return Err(ConfigError::InvalidBatchSize(self.embed_batch_size));
        }
        Ok(())
    }

    /// Base URL of the Generative AI inference service for the configured region.
    #[inline]
    pub fn inference_endpoint(&self) -> Result<Url, ConfigError> {
        let url_str = format!(
            "https://inference.generativeai.{}.oci.oraclecloud.com",
            self.region
        );
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

impl VectorConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::InvalidUrl(self.database_url.clone()));
        }
        if self.table.trim().is_empty() {
            return Err(ConfigError::InvalidTable(self.table.clone()));
        }
        Ok(())
    }
}

impl SpeechConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::InvalidRegion(self.region.clone()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidPollInterval(self.poll_interval_secs));
        }
        Ok(())
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[inline]
    pub fn speech_endpoint(&self) -> Result<Url, ConfigError> {
        let url_str = format!("https://speech.aiservice.{}.oci.oraclecloud.com", self.region);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn object_storage_endpoint(&self) -> Result<Url, ConfigError> {
        let url_str = format!("https://objectstorage.{}.oraclecloud.com", self.region);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}
