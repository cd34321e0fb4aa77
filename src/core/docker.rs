/// Docker integration
///
/// Lists running containers and their resource usage through the Docker
/// Engine API. One failing or stalled stats call only drops that
/// container's usage.

use async_trait::async_trait;
use bollard::container::{ListContainersOptions, Stats, StatsOptions};
use bollard::models::ContainerSummary;
use bollard::Docker;
use futures::future::join_all;
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::core::category::MetricCategory;
use crate::core::config::DEFAULT_SOURCE_TIMEOUT;
use crate::core::payload::{percent_of, ContainerStats, ContainerUsage, Payload};
use crate::core::sources::{Reading, Source, SourceError};

pub struct ContainerSource {
    docker: Option<Docker>,
    /// Budget for one container's stats call, below the sampler's source timeout
    stats_timeout: Duration,
}

impl ContainerSource {
    /// The daemon connection is opened lazily on the first sample
    pub fn new(stats_timeout: Duration) -> Self {
        Self {
            docker: None,
            stats_timeout,
        }
    }

    fn client(&mut self) -> Result<Docker, SourceError> {
        if let Some(docker) = &self.docker {
            return Ok(docker.clone());
        }

        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SourceError::Unavailable(format!("Failed to connect to Docker daemon: {}", e)))?;
        self.docker = Some(docker.clone());
        Ok(docker)
    }
}

impl Default for ContainerSource {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_TIMEOUT / 2)
    }
}

#[async_trait]
impl Source for ContainerSource {
    fn category(&self) -> MetricCategory {
        MetricCategory::Containers
    }

    async fn sample(&mut self) -> Result<Reading, SourceError> {
        let docker = self.client()?;

        let options = Some(ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        });

        let containers = docker.list_containers(options).await.map_err(classify_error)?;

        // Stats calls are slow (the daemon samples twice), so run them in parallel
        let limit = self.stats_timeout;
        let stats_futures = containers.into_iter().map(|summary| {
            let docker = docker.clone();
            async move {
                let mut info = container_from_summary(summary);
                info.usage = bounded_usage(&info.name, limit, container_usage(&docker, &info.id)).await;
                info
            }
        });

        let mut stats = join_all(stats_futures).await;
        stats.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Reading::Value(Payload::Containers(stats)))
    }
}

/// Daemon-side errors are transient; anything else means no reachable daemon
fn classify_error(err: bollard::errors::Error) -> SourceError {
    if matches!(err, bollard::errors::Error::DockerResponseServerError { .. }) {
        SourceError::Transient(format!("Docker API error: {}", err))
    } else {
        SourceError::Unavailable(format!("Docker daemon unreachable: {}", err))
    }
}

fn container_from_summary(summary: ContainerSummary) -> ContainerStats {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| "unknown".to_string());

    ContainerStats {
        id: summary.id.unwrap_or_default(),
        name,
        image: summary.image.unwrap_or_default(),
        state: summary.state.unwrap_or_default(),
        status: summary.status.unwrap_or_default(),
        usage: None,
    }
}

/// Usage from one stats call, or `None` when it fails or outlives `limit`
async fn bounded_usage<F>(container: &str, limit: Duration, usage: F) -> Option<ContainerUsage>
where
    F: Future<Output = Result<Option<ContainerUsage>, SourceError>>,
{
    match tokio::time::timeout(limit, usage).await {
        Ok(Ok(usage)) => usage,
        Ok(Err(e)) => {
            debug!(container = %container, error = %e, "container stats unavailable");
            None
        }
        Err(_) => {
            debug!(container = %container, timeout = ?limit, "container stats timed out");
            None
        }
    }
}

async fn container_usage(docker: &Docker, container_id: &str) -> Result<Option<ContainerUsage>, SourceError> {
    let mut stats_stream = docker.stats(
        container_id,
        Some(StatsOptions {
            stream: false,
            one_shot: false,
        }),
    );

    match stats_stream.next().await {
        Some(Ok(stats)) => Ok(Some(usage_from_stats(&stats))),
        Some(Err(e)) => Err(classify_error(e)),
        None => Ok(None),
    }
}

fn usage_from_stats(stats: &Stats) -> ContainerUsage {
    let cpu_percent = cpu_percent(
        stats.cpu_stats.cpu_usage.total_usage,
        stats.precpu_stats.cpu_usage.total_usage,
        stats.cpu_stats.system_cpu_usage.unwrap_or(0),
        stats.precpu_stats.system_cpu_usage.unwrap_or(0),
        stats.cpu_stats.online_cpus.unwrap_or(1),
    );

    let memory_usage = stats.memory_stats.usage.unwrap_or(0);
    let memory_limit = stats.memory_stats.limit.unwrap_or(0);

    let (network_rx, network_tx) = stats
        .networks
        .as_ref()
        .map(|networks| {
            networks.values().fold((0u64, 0u64), |(rx, tx), net| {
                (rx.saturating_add(net.rx_bytes), tx.saturating_add(net.tx_bytes))
            })
        })
        .unwrap_or((0, 0));

    ContainerUsage {
        cpu_percent,
        memory_usage_bytes: memory_usage,
        memory_limit_bytes: memory_limit,
        memory_percent: percent_of(memory_usage, memory_limit),
        network_rx_bytes: network_rx,
        network_tx_bytes: network_tx,
    }
}

/// Container CPU share the way `docker stats` computes it.
///
/// Counter anomalies (a smaller current value) yield zero instead of a
/// wrapped delta.
pub fn cpu_percent(total: u64, pre_total: u64, system: u64, pre_system: u64, online_cpus: u64) -> f64 {
    let cpu_delta = total.saturating_sub(pre_total);
    let system_delta = system.saturating_sub(pre_system);

    if system_delta == 0 {
        return 0.0;
    }

    (cpu_delta as f64 / system_delta as f64) * online_cpus.max(1) as f64 * 100.0
}
