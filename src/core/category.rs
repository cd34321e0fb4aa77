/// Metric categories sampled by the monitor
///
/// Each category is refreshed on its own interval, independently of the
/// others. The set is fixed at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Cpu,
    Memory,
    Disk,
    DiskIo,
    Network,
    Gpu,
    TopProcesses,
    Containers,
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 8] = [
        MetricCategory::Cpu,
        MetricCategory::Memory,
        MetricCategory::Disk,
        MetricCategory::DiskIo,
        MetricCategory::Network,
        MetricCategory::Gpu,
        MetricCategory::TopProcesses,
        MetricCategory::Containers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Cpu => "cpu",
            MetricCategory::Memory => "memory",
            MetricCategory::Disk => "disk",
            MetricCategory::DiskIo => "disk_io",
            MetricCategory::Network => "network",
            MetricCategory::Gpu => "gpu",
            MetricCategory::TopProcesses => "top_processes",
            MetricCategory::Containers => "containers",
        }
    }

    /// Refresh interval used when neither the config file nor the CLI sets one
    pub fn default_interval(&self) -> Duration {
        match self {
            MetricCategory::Cpu
            | MetricCategory::Memory
            | MetricCategory::Network
            | MetricCategory::DiskIo => Duration::from_secs(1),
            MetricCategory::Gpu | MetricCategory::TopProcesses => Duration::from_secs(2),
            MetricCategory::Disk => Duration::from_secs(5),
            MetricCategory::Containers => Duration::from_secs(10),
        }
    }

    /// Whether the source reports monotonically increasing counters that
    /// have to be turned into rates
    pub fn is_counter(&self) -> bool {
        matches!(self, MetricCategory::DiskIo | MetricCategory::Network)
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricCategory {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        MetricCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownCategory(s.to_string()))
    }
}
