/// Application configuration management
/// Stores user preferences in ~/.config/ez-monitor/config.toml

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config::{parse_duration, ConfigError, SamplerConfig, DEFAULT_TOP_PROCESSES};
use crate::core::MetricCategory;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors: false,
        }
    }
}

/// Durations are kept as human strings ("1s", "500ms") so the file
/// round-trips the way users write it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    pub base_interval: String,
    pub source_timeout: String,
    pub top_processes: usize,
    pub intervals: BTreeMap<String, String>,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        let defaults = SamplerConfig::default();
        Self {
            base_interval: humantime::format_duration(defaults.base_interval).to_string(),
            source_timeout: humantime::format_duration(defaults.source_timeout).to_string(),
            top_processes: DEFAULT_TOP_PROCESSES,
            intervals: defaults
                .intervals
                .iter()
                .map(|(category, interval)| (category.to_string(), humantime::format_duration(*interval).to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub sampler: SamplerSettings,
}

impl AppConfig {
    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine the user config directory"))?
            .join("ez-monitor");

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from an explicit path, or the default location.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::config_path()?;
                if !path.exists() {
                    return Ok(Self::default());
                }
                Self::load_from(&path)
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Resolve the sampler section into a validated sampler configuration
    pub fn sampler_config(&self) -> Result<SamplerConfig, ConfigError> {
        let mut config = SamplerConfig {
            base_interval: parse_duration(&self.sampler.base_interval)?,
            source_timeout: parse_duration(&self.sampler.source_timeout)?,
            top_processes: self.sampler.top_processes,
            ..SamplerConfig::default()
        };

        for (name, interval) in &self.sampler.intervals {
            let category: MetricCategory = name.parse()?;
            config.set_interval(category, parse_duration(interval)?);
        }

        config.validate()?;
        Ok(config)
    }
}
