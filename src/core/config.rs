/// Sampler configuration
///
/// Built from defaults, the config file and CLI flags before the sampler
/// starts. It is immutable while the sampler runs.

use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use super::category::MetricCategory;

pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TOP_PROCESSES: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown metric category '{0}' (expected one of: cpu, memory, disk, disk_io, network, gpu, top_processes, containers)")]
    UnknownCategory(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(String),

    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("invalid interval override '{0}' (expected <category>=<duration>, e.g. containers=10s)")]
    InvalidOverride(String),

    #[error("top process count must be at least 1")]
    ZeroTopProcesses,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Cadence of the sampler loop
    pub base_interval: Duration,
    /// Upper bound for a single source call
    pub source_timeout: Duration,
    /// Refresh interval per category; categories missing here are not sampled
    pub intervals: BTreeMap<MetricCategory, Duration>,
    pub top_processes: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            base_interval: DEFAULT_BASE_INTERVAL,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            intervals: MetricCategory::ALL
                .iter()
                .map(|c| (*c, c.default_interval()))
                .collect(),
            top_processes: DEFAULT_TOP_PROCESSES,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("base interval".to_string()));
        }
        if self.source_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("source timeout".to_string()));
        }
        if let Some((category, _)) = self.intervals.iter().find(|(_, interval)| interval.is_zero()) {
            return Err(ConfigError::ZeroDuration(format!("{} interval", category)));
        }
        if self.top_processes == 0 {
            return Err(ConfigError::ZeroTopProcesses);
        }
        Ok(())
    }

    pub fn set_interval(&mut self, category: MetricCategory, interval: Duration) {
        self.intervals.insert(category, interval);
    }
}

/// Parse a human duration such as "500ms", "1s" or "2m"
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a `<category>=<duration>` CLI override
pub fn parse_interval_override(value: &str) -> Result<(MetricCategory, Duration), ConfigError> {
    let (category, duration) = value
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidOverride(value.to_string()))?;

    Ok((category.parse()?, parse_duration(duration)?))
}
