/// Counter samples and throughput calculation
///
/// Disk I/O and network sources report monotonically increasing byte
/// counters. Two consecutive samples of the same category are differenced
/// here to get bytes per second.
///
/// Counters are keyed per device ("eth0/bytes_sent") and summed only after
/// differencing, so a device appearing or disappearing between samples
/// never shows up as a jump in the aggregate.

use std::collections::BTreeMap;
use std::time::Instant;

use super::category::MetricCategory;

/// Raw counter values keyed by `device/counter` (e.g. "sda/read_bytes")
pub type Counters = BTreeMap<String, u64>;

/// Bytes per second keyed by the same names
pub type Throughputs = BTreeMap<String, f64>;

pub fn counter_key(device: &str, counter: &str) -> String {
    format!("{}/{}", device, counter)
}

/// Counter name of a key, ignoring the device part
fn counter_name(key: &str) -> &str {
    key.rsplit_once('/').map_or(key, |(_, name)| name)
}

/// Sum of one counter's rate across every device
pub fn total_rate(rates: &Throughputs, counter: &str) -> f64 {
    rates
        .iter()
        .filter(|(key, _)| counter_name(key) == counter)
        .map(|(_, rate)| rate)
        .sum()
}

/// Sum of one counter's raw value across every device
pub fn total_count(counters: &Counters, counter: &str) -> u64 {
    counters
        .iter()
        .filter(|(key, _)| counter_name(key) == counter)
        .fold(0u64, |sum, (_, value)| sum.saturating_add(*value))
}

/// One reading of a counter-bearing category. Only the latest one per
/// category is kept by the sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSample {
    pub category: MetricCategory,
    pub counters: Counters,
    pub taken_at: Instant,
}

impl CounterSample {
    pub fn new(category: MetricCategory, counters: Counters, taken_at: Instant) -> Self {
        Self {
            category,
            counters,
            taken_at,
        }
    }

    /// Seconds elapsed since an earlier sample
    pub fn seconds_since(&self, earlier: &CounterSample) -> f64 {
        self.taken_at
            .saturating_duration_since(earlier.taken_at)
            .as_secs_f64()
    }
}

/// Compute `max(0, curr - prev) / elapsed` for every counter in `curr`.
///
/// A non-positive (or non-finite) elapsed time yields zero for every
/// counter. A counter missing from `prev` also yields zero.
pub fn rate(prev: &Counters, curr: &Counters, elapsed_secs: f64) -> Throughputs {
    let measurable = elapsed_secs.is_finite() && elapsed_secs > 0.0;

    curr.iter()
        .map(|(name, &now)| {
            let per_sec = match prev.get(name) {
                Some(&before) if measurable => now.saturating_sub(before) as f64 / elapsed_secs,
                _ => 0.0,
            };
            (name.clone(), per_sec)
        })
        .collect()
}

/// Throughputs for a fresh sample against the previous one, if any.
///
/// Returns the rates plus the names of counters that could not be
/// differenced (missing from the previous sample).
pub fn rate_between(prev: Option<&CounterSample>, curr: &CounterSample) -> (Throughputs, Vec<String>) {
    match prev {
        Some(prev) => {
            let missing = curr
                .counters
                .keys()
                .filter(|name| !prev.counters.contains_key(*name))
                .cloned()
                .collect();
            (rate(&prev.counters, &curr.counters, curr.seconds_since(prev)), missing)
        }
        None => (rate(&Counters::new(), &curr.counters, 0.0), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn counters(pairs: &[(&str, u64)]) -> Counters {
        pairs.iter().map(|(name, value)| (name.to_string(), *value)).collect()
    }

    #[test]
    fn test_rate_increasing_counters() {
        let prev = counters(&[("read_bytes", 1000), ("write_bytes", 500)]);
        let curr = counters(&[("read_bytes", 3000), ("write_bytes", 500)]);

        let rates = rate(&prev, &curr, 2.0);
        assert_eq!(rates["read_bytes"], 1000.0);
        assert_eq!(rates["write_bytes"], 0.0);
    }

    #[test]
    fn test_rate_matches_formula() {
        for (prev, curr, elapsed) in [(0u64, 0u64, 1.0), (10, 15, 0.5), (1 << 40, (1 << 40) + 4096, 4.0)] {
            let rates = rate(&counters(&[("x", prev)]), &counters(&[("x", curr)]), elapsed);
            assert_eq!(rates["x"], (curr - prev) as f64 / elapsed);
        }
    }

    #[test]
    fn test_rate_counter_reset_clamps_to_zero() {
        let prev = counters(&[("bytes_recv", u64::MAX - 10)]);
        let curr = counters(&[("bytes_recv", 42)]);

        let rates = rate(&prev, &curr, 1.0);
        assert_eq!(rates["bytes_recv"], 0.0);
    }

    #[test]
    fn test_rate_non_positive_elapsed_is_zero() {
        let prev = counters(&[("bytes_sent", 0)]);
        let curr = counters(&[("bytes_sent", 1_000_000)]);

        for elapsed in [0.0, -1.0, f64::NAN] {
            let rates = rate(&prev, &curr, elapsed);
            assert_eq!(rates["bytes_sent"], 0.0);
        }
    }

    #[test]
    fn test_rate_missing_previous_counter_is_zero() {
        let prev = counters(&[("read_bytes", 100)]);
        let curr = counters(&[("read_bytes", 300), ("write_bytes", 900)]);

        let rates = rate(&prev, &curr, 1.0);
        assert_eq!(rates["read_bytes"], 200.0);
        assert_eq!(rates["write_bytes"], 0.0);
    }

    #[test]
    fn test_rate_between_uses_sample_timestamps() {
        let t0 = Instant::now();
        let prev = CounterSample::new(MetricCategory::DiskIo, counters(&[("read_bytes", 1000), ("write_bytes", 500)]), t0);
        let curr = CounterSample::new(
            MetricCategory::DiskIo,
            counters(&[("read_bytes", 3000), ("write_bytes", 500)]),
            t0 + Duration::from_secs(2),
        );

        let (rates, missing) = rate_between(Some(&prev), &curr);
        assert_eq!(rates["read_bytes"], 1000.0);
        assert_eq!(rates["write_bytes"], 0.0);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_rate_between_first_sample_is_zero() {
        let curr = CounterSample::new(MetricCategory::Network, counters(&[("bytes_sent", 5000)]), Instant::now());

        let (rates, missing) = rate_between(None, &curr);
        assert_eq!(rates["bytes_sent"], 0.0);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_counter_key_and_totals() {
        assert_eq!(counter_key("eth0", "bytes_sent"), "eth0/bytes_sent");

        let raw = counters(&[("eth0/bytes_sent", 10), ("wlan0/bytes_sent", 5), ("eth0/bytes_recv", 7)]);
        assert_eq!(total_count(&raw, "bytes_sent"), 15);
        assert_eq!(total_count(&raw, "bytes_recv"), 7);
        assert_eq!(total_count(&raw, "read_bytes"), 0);

        let rates: Throughputs = [("sda/read_bytes".to_string(), 100.0), ("nvme0n1/read_bytes".to_string(), 50.0)]
            .into_iter()
            .collect();
        assert_eq!(total_rate(&rates, "read_bytes"), 150.0);
    }

    #[test]
    fn test_device_disappearing_does_not_hide_traffic() {
        let t0 = Instant::now();
        let prev = CounterSample::new(
            MetricCategory::Network,
            counters(&[("eth0/bytes_recv", 1_000), ("docker0/bytes_recv", 50_000_000)]),
            t0,
        );
        let curr = CounterSample::new(
            MetricCategory::Network,
            counters(&[("eth0/bytes_recv", 3_000)]),
            t0 + Duration::from_secs(1),
        );

        let (rates, missing) = rate_between(Some(&prev), &curr);
        assert_eq!(total_rate(&rates, "bytes_recv"), 2_000.0);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_device_appearing_does_not_spike() {
        let t0 = Instant::now();
        let prev = CounterSample::new(MetricCategory::Network, counters(&[("eth0/bytes_recv", 1_000)]), t0);
        let curr = CounterSample::new(
            MetricCategory::Network,
            counters(&[("eth0/bytes_recv", 1_500), ("veth9/bytes_recv", 80_000_000)]),
            t0 + Duration::from_secs(1),
        );

        let (rates, missing) = rate_between(Some(&prev), &curr);
        assert_eq!(total_rate(&rates, "bytes_recv"), 500.0);
        assert_eq!(missing, vec!["veth9/bytes_recv".to_string()]);
    }
}
