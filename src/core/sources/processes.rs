/// Top processes by CPU usage

use async_trait::async_trait;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::{run_blocking, Baseline, Reading, Source, SourceError};
use crate::core::category::MetricCategory;
use crate::core::payload::{Payload, ProcessStats};

pub struct ProcessSource {
    system: Arc<Mutex<System>>,
    limit: usize,
    baseline: Baseline,
}

impl ProcessSource {
    pub fn new(limit: usize) -> Self {
        // Per-process CPU usage needs a previous refresh to diff against
        let mut system = System::new();
        system.refresh_processes();

        Self {
            system: Arc::new(Mutex::new(system)),
            limit,
            baseline: Baseline::taken_now(MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }
}

#[async_trait]
impl Source for ProcessSource {
    fn category(&self) -> MetricCategory {
        MetricCategory::TopProcesses
    }

    async fn sample(&mut self) -> Result<Reading, SourceError> {
        self.baseline.settle().await;
        let limit = self.limit;

        run_blocking(&self.system, move |system| {
            system.refresh_processes();

            let processes: Vec<ProcessStats> = system
                .processes()
                .values()
                .map(|p| ProcessStats {
                    pid: p.pid().as_u32(),
                    name: p.name().to_string(),
                    cpu_percent: p.cpu_usage(),
                    memory_bytes: p.memory(),
                    status: p.status().to_string(),
                })
                .collect();

            if processes.is_empty() {
                return Err(SourceError::Unavailable("process table is empty or unreadable".to_string()));
            }

            Ok(Reading::Value(Payload::TopProcesses(top_by_cpu(processes, limit))))
        })
        .await
    }
}

/// Highest CPU first, then highest memory, then lowest pid
fn top_by_cpu(mut processes: Vec<ProcessStats>, limit: usize) -> Vec<ProcessStats> {
    processes.sort_by(|a, b| {
        b.cpu_percent
            .partial_cmp(&a.cpu_percent)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.memory_bytes.cmp(&a.memory_bytes))
            .then_with(|| a.pid.cmp(&b.pid))
    });
    processes.truncate(limit);
    processes
}
