/// Background sampler loop
///
/// Wakes on a fixed cadence, samples every due category concurrently, turns
/// counters into rates and merges the whole tick into the snapshot store in
/// one update. Nothing a source does (error, hang, panic) stops the loop.

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::category::MetricCategory;
use super::config::{ConfigError, SamplerConfig};
use super::payload::{DiskIoRates, NetworkRates, Payload};
use super::rate::{rate_between, total_count, total_rate, CounterSample, Throughputs};
use super::scheduler::Scheduler;
use super::snapshot::{CategoryEntry, MetricValue, SnapshotStore};
use super::sources::{disk_io, network, Reading, Source, SourceError};

/// Sleep before the next tick so sampling cost does not accumulate drift.
/// A tick that overran the base interval is followed immediately.
pub fn next_sleep(base_interval: Duration, spent: Duration) -> Duration {
    base_interval.saturating_sub(spent)
}

/// Outcome of one tick, mostly for logging and tests
#[derive(Debug, Clone)]
pub struct TickReport {
    pub started: Instant,
    pub since_last_tick: Option<Duration>,
    pub sampled: Vec<MetricCategory>,
    pub failed: Vec<MetricCategory>,
    pub duration: Duration,
}

pub struct Sampler {
    config: SamplerConfig,
    store: SnapshotStore,
    scheduler: Scheduler,
    sources: Vec<Box<dyn Source>>,
    previous: HashMap<MetricCategory, CounterSample>,
    failing: HashSet<MetricCategory>,
    last_tick: Option<Instant>,
}

/// Clock reads go through tokio so a paused test clock drives the loop
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

impl Sampler {
    pub fn new(config: SamplerConfig, store: SnapshotStore, sources: Vec<Box<dyn Source>>) -> Result<Self, ConfigError> {
        config.validate()?;

        let available: HashSet<MetricCategory> = sources.iter().map(|s| s.category()).collect();
        let intervals: BTreeMap<MetricCategory, Duration> = config
            .intervals
            .iter()
            .filter(|(category, _)| {
                let has_source = available.contains(*category);
                if !has_source {
                    warn!(category = %category, "interval configured but no source registered");
                }
                has_source
            })
            .map(|(category, interval)| (*category, *interval))
            .collect();

        Ok(Self {
            scheduler: Scheduler::new(intervals),
            config,
            store,
            sources,
            previous: HashMap::new(),
            failing: HashSet::new(),
            last_tick: None,
        })
    }

    /// Run one tick: sample the due categories and merge them as one batch
    pub async fn tick(&mut self) -> TickReport {
        let started = now();
        let since_last_tick = self.last_tick.map(|last| started.saturating_duration_since(last));
        self.last_tick = Some(started);

        let due = self.scheduler.due_categories(started);
        debug!(due = ?due, since_last_tick = ?since_last_tick, "sampler tick");

        let timeout = self.config.source_timeout;
        let readings = self
            .sources
            .iter_mut()
            .filter(|source| due.contains(&source.category()))
            .map(|source| sample_with_timeout(source.as_mut(), timeout));

        let results = join_all(readings).await;

        let mut batch = Vec::with_capacity(results.len());
        let mut sampled = Vec::with_capacity(results.len());
        let mut failed = Vec::new();

        for outcome in results {
            let value = match outcome.result {
                Ok(reading) => self.publishable(outcome.category, reading, outcome.finished),
                Err(err) => Err(err),
            };

            let value = match value {
                Ok(payload) => {
                    if self.failing.remove(&outcome.category) {
                        info!(category = %outcome.category, "source recovered");
                    }
                    MetricValue::Ok(payload)
                }
                Err(err) => {
                    if self.failing.insert(outcome.category) {
                        warn!(category = %outcome.category, error = %err, "source failed");
                    } else {
                        debug!(category = %outcome.category, error = %err, "source still failing");
                    }
                    failed.push(outcome.category);
                    MetricValue::Failed(err.into())
                }
            };

            self.scheduler.mark_refreshed(outcome.category, started);
            sampled.push(outcome.category);
            batch.push((outcome.category, CategoryEntry::new(value, Utc::now(), outcome.elapsed)));
        }

        self.store.merge(batch);

        let duration = now().saturating_duration_since(started);
        debug!(sampled = sampled.len(), failed = failed.len(), took = ?duration, "tick merged");

        TickReport {
            started,
            since_last_tick,
            sampled,
            failed,
            duration,
        }
    }

    /// Turn a source reading into a payload, running counters through the
    /// rate calculator against the previous sample of that category.
    fn publishable(&mut self, category: MetricCategory, reading: Reading, taken_at: Instant) -> Result<Payload, SourceError> {
        let (counters, devices) = match reading {
            Reading::Value(payload) => return Ok(payload),
            Reading::Counters { counters, devices } => (counters, devices),
        };

        let sample = CounterSample::new(category, counters, taken_at);
        let (rates, missing) = rate_between(self.previous.get(&category), &sample);
        if !missing.is_empty() {
            debug!(category = %category, missing = ?missing, "counters without a previous value, reporting zero rate");
        }

        let payload = counter_payload(category, &rates, &sample, devices)?;
        self.previous.insert(category, sample);
        Ok(payload)
    }

    /// Sample forever on the base cadence. Only process shutdown ends it.
    pub async fn run(mut self) {
        info!(
            base_interval = ?self.config.base_interval,
            source_timeout = ?self.config.source_timeout,
            sources = self.sources.len(),
            "sampler started"
        );
        self.drive(None).await;
    }

    /// Spawn the loop on the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn drive(&mut self, max_ticks: Option<usize>) {
        let mut completed = 0usize;
        loop {
            let report = self.tick().await;
            completed += 1;
            if max_ticks.is_some_and(|max| completed >= max) {
                return;
            }

            let pause = next_sleep(self.config.base_interval, report.duration);
            if pause.is_zero() {
                debug!(took = ?report.duration, "tick overran base interval, starting next tick immediately");
            }
            tokio::time::sleep(pause).await;
        }
    }
}

struct Outcome {
    category: MetricCategory,
    result: Result<Reading, SourceError>,
    elapsed: Duration,
    finished: Instant,
}

/// Call a source with a timeout, converting hangs and panics into failures
async fn sample_with_timeout(source: &mut dyn Source, timeout: Duration) -> Outcome {
    let category = source.category();
    let begun = now();

    let result = match tokio::time::timeout(timeout, AssertUnwindSafe(source.sample()).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(SourceError::Transient(format!("{} source panicked", category))),
        Err(_) => Err(SourceError::Transient(format!(
            "timed out after {}",
            humantime::format_duration(timeout)
        ))),
    };

    let finished = now();
    Outcome {
        category,
        result,
        elapsed: finished.saturating_duration_since(begun),
        finished,
    }
}

/// Per-device rates summed into the category payload
fn counter_payload(
    category: MetricCategory,
    rates: &Throughputs,
    sample: &CounterSample,
    devices: u64,
) -> Result<Payload, SourceError> {
    let rate = |name: &str| total_rate(rates, name);
    let total = |name: &str| total_count(&sample.counters, name);

    match category {
        MetricCategory::DiskIo => Ok(Payload::DiskIo(DiskIoRates {
            read_bytes_per_sec: rate(disk_io::READ_BYTES),
            write_bytes_per_sec: rate(disk_io::WRITE_BYTES),
        })),
        MetricCategory::Network => Ok(Payload::Network(NetworkRates {
            sent_bytes_per_sec: rate(network::BYTES_SENT),
            recv_bytes_per_sec: rate(network::BYTES_RECV),
            total_sent_bytes: total(network::BYTES_SENT),
            total_recv_bytes: total(network::BYTES_RECV),
            interfaces: devices,
        })),
        other => Err(SourceError::Transient(format!("{} source returned raw counters", other))),
    }
}
