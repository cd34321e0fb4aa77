/// CPU usage, frequency and load

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::{run_blocking, Baseline, Reading, Source, SourceError};
use crate::core::category::MetricCategory;
use crate::core::payload::{CpuStats, Payload};

pub struct CpuSource {
    system: Arc<Mutex<System>>,
    baseline: Baseline,
}

impl CpuSource {
    pub fn new() -> Self {
        // Usage is computed against the previous refresh, so take a baseline now
        let mut system = System::new();
        system.refresh_cpu();

        Self {
            system: Arc::new(Mutex::new(system)),
            baseline: Baseline::taken_now(MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for CpuSource {
    fn category(&self) -> MetricCategory {
        MetricCategory::Cpu
    }

    async fn sample(&mut self) -> Result<Reading, SourceError> {
        self.baseline.settle().await;
        let (running, tasks) = read_task_counts().await;

        run_blocking(&self.system, move |system| {
            system.refresh_cpu();

            let cpus = system.cpus();
            if cpus.is_empty() {
                return Err(SourceError::Unavailable("no CPUs reported by the OS".to_string()));
            }

            let per_core_percent: Vec<f32> = cpus.iter().map(|c| c.cpu_usage()).collect();
            let frequency_mhz = cpus.iter().map(|c| c.frequency()).max().unwrap_or(0);
            let load = System::load_average();

            Ok(Reading::Value(Payload::Cpu(CpuStats {
                usage_percent: system.global_cpu_info().cpu_usage(),
                per_core_percent,
                frequency_mhz,
                load_average: [load.one, load.five, load.fifteen],
                running,
                tasks,
            })))
        })
        .await
    }
}

/// Runnable and total task counts from /proc/loadavg (Linux only)
async fn read_task_counts() -> (Option<u64>, Option<u64>) {
    match tokio::fs::read_to_string("/proc/loadavg").await {
        Ok(contents) => parse_loadavg_tasks(&contents),
        Err(_) => (None, None),
    }
}

/// Parse the "running/total" field of /proc/loadavg
fn parse_loadavg_tasks(contents: &str) -> (Option<u64>, Option<u64>) {
    let Some(field) = contents.split_whitespace().nth(3) else {
        return (None, None);
    };

    match field.split_once('/') {
        Some((running, total)) => (running.parse().ok(), total.parse().ok()),
        None => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loadavg_tasks() {
        assert_eq!(parse_loadavg_tasks("0.20 0.18 0.12 1/80 11206\n"), (Some(1), Some(80)));
        assert_eq!(parse_loadavg_tasks("0.20 0.18"), (None, None));
        assert_eq!(parse_loadavg_tasks("0.20 0.18 0.12 garbage 1"), (None, None));
    }

    #[tokio::test]
    async fn test_first_sample_waits_for_baseline() {
        let constructed = std::time::Instant::now();
        let mut source = CpuSource::new();
        let _ = source.sample().await;
        assert!(constructed.elapsed() >= MINIMUM_CPU_UPDATE_INTERVAL);

        // Later samples diff against the previous refresh and do not wait
        let again = std::time::Instant::now();
        let _ = source.sample().await;
        assert!(again.elapsed() < MINIMUM_CPU_UPDATE_INTERVAL + std::time::Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cpu_sample_is_finite() {
        let mut source = CpuSource::new();
        match source.sample().await {
            Ok(Reading::Value(Payload::Cpu(stats))) => {
                assert!(stats.usage_percent.is_finite());
                assert!(!stats.per_core_percent.is_empty());
            }
            Ok(other) => panic!("unexpected reading: {:?}", other),
            // Containers without a visible /proc may report no CPUs
            Err(e) => assert!(matches!(e, SourceError::Unavailable(_))),
        }
    }
}
