/// Network byte counters for every non-loopback interface

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::Networks;

use super::{run_blocking, Reading, Source, SourceError};
use crate::core::category::MetricCategory;
use crate::core::rate::{counter_key, Counters};

pub const BYTES_SENT: &str = "bytes_sent";
pub const BYTES_RECV: &str = "bytes_recv";

pub struct NetworkSource {
    networks: Arc<Mutex<Networks>>,
}

impl NetworkSource {
    pub fn new() -> Self {
        Self {
            networks: Arc::new(Mutex::new(Networks::new())),
        }
    }
}

impl Default for NetworkSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for NetworkSource {
    fn category(&self) -> MetricCategory {
        MetricCategory::Network
    }

    async fn sample(&mut self) -> Result<Reading, SourceError> {
        run_blocking(&self.networks, |networks| {
            // Picks up interfaces that appeared since the last sample
            networks.refresh_list();

            let totals = networks
                .iter()
                .map(|(name, data)| (name.as_str(), data.total_transmitted(), data.total_received()));

            let (counters, devices) = interface_counters(totals)?;
            Ok(Reading::Counters { counters, devices })
        })
        .await
    }
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name.eq_ignore_ascii_case("loopback")
}

/// Per-interface counters from (name, sent, received) totals, skipping
/// loopback. Also returns the number of interfaces kept.
fn interface_counters<'a, I>(interfaces: I) -> Result<(Counters, u64), SourceError>
where
    I: IntoIterator<Item = (&'a str, u64, u64)>,
{
    let mut counters = Counters::new();
    let mut count = 0u64;

    for (name, tx, rx) in interfaces {
        if is_loopback(name) {
            continue;
        }
        counters.insert(counter_key(name, BYTES_SENT), tx);
        counters.insert(counter_key(name, BYTES_RECV), rx);
        count += 1;
    }

    if count == 0 {
        return Err(SourceError::Unavailable("no network interfaces besides loopback".to_string()));
    }

    Ok((counters, count))
}
