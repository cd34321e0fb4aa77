/// Source adapters, one per metric category
///
/// Every adapter returns `Result<Reading, SourceError>` and never panics
/// into the sampler. Sources that block (sysinfo refreshes) run on the
/// blocking pool so the sampler's timeout can always fire.

pub mod cpu;
pub mod disk;
pub mod disk_io;
pub mod gpu;
pub mod memory;
pub mod network;
pub mod processes;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::category::MetricCategory;
use super::config::SamplerConfig;
use super::payload::Payload;
use super::rate::Counters;
use super::snapshot::Failure;

pub use cpu::CpuSource;
pub use disk::DiskSource;
pub use disk_io::DiskIoSource;
pub use gpu::GpuSource;
pub use memory::MemorySource;
pub use network::NetworkSource;
pub use processes::ProcessSource;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// Feature, device or daemon not present on this host
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Source failed this cycle; retried on the next interval
    #[error("{0}")]
    Transient(String),
}

impl From<SourceError> for Failure {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(detail) => Failure::unavailable(detail),
            SourceError::Transient(detail) => Failure::transient(detail),
        }
    }
}

pub(crate) const REFRESH_IN_FLIGHT: &str = "previous refresh still running";

/// What a source hands back to the sampler
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// Ready to publish as-is
    Value(Payload),
    /// Raw monotonic counters keyed per device, turned into rates by the
    /// sampler. `devices` is a gauge and never differenced.
    Counters { counters: Counters, devices: u64 },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Source: Send {
    fn category(&self) -> MetricCategory;

    async fn sample(&mut self) -> Result<Reading, SourceError>;
}

/// Run a blocking refresh against shared state on the blocking thread pool.
///
/// A refresh abandoned by the sampler's timeout keeps running and keeps the
/// state locked. Later calls fail fast until it finishes, so at most one
/// blocking refresh per source is ever in flight.
pub(crate) async fn run_blocking<S, T, F>(state: &Arc<Mutex<S>>, refresh: F) -> Result<T, SourceError>
where
    S: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut S) -> Result<T, SourceError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        let Some(mut guard) = state.try_lock() else {
            return Err(SourceError::Transient(REFRESH_IN_FLIGHT.to_string()));
        };
        refresh(&mut guard)
    })
    .await
    .map_err(|e| SourceError::Transient(format!("refresh task failed: {}", e)))?
}

/// Baseline refresh of a delta-based source.
///
/// sysinfo computes CPU usage between two refreshes. Until the baseline is
/// `minimum` old the second refresh yields since-boot averages and zeros, so
/// the first sample waits out the remainder.
pub(crate) struct Baseline {
    taken_at: tokio::time::Instant,
    minimum: Duration,
    settled: bool,
}

impl Baseline {
    pub(crate) fn taken_now(minimum: Duration) -> Self {
        Self {
            taken_at: tokio::time::Instant::now(),
            minimum,
            settled: false,
        }
    }

    pub(crate) fn remaining(&self, now: tokio::time::Instant) -> Duration {
        if self.settled {
            return Duration::ZERO;
        }
        (self.taken_at + self.minimum).saturating_duration_since(now)
    }

    pub(crate) async fn settle(&mut self) {
        let remaining = self.remaining(tokio::time::Instant::now());
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
        self.settled = true;
    }
}

/// All built-in sources. Containers come from the Docker module.
///
/// Per-container stats calls get half the source timeout so one stalled
/// container cannot time out the whole category.
pub fn default_sources(config: &SamplerConfig) -> Vec<Box<dyn Source>> {
    vec![
        Box::new(CpuSource::new()),
        Box::new(MemorySource::new()),
        Box::new(DiskSource::new()),
        Box::new(DiskIoSource::new()),
        Box::new(NetworkSource::new()),
        Box::new(GpuSource::new()),
        Box::new(ProcessSource::new(config.top_processes)),
        Box::new(crate::core::docker::ContainerSource::new(config.source_timeout / 2)),
    ]
}
