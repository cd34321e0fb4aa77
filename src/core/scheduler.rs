/// Per-category refresh scheduling
///
/// Decides on every tick which categories are due. Each category keeps its
/// own interval and last-refreshed instant, so an expensive source on a long
/// interval never holds back a cheap one that samples every tick.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::category::MetricCategory;

/// A category is due when it was never sampled or its interval has elapsed
pub fn due(now: Instant, last_refreshed: Option<Instant>, interval: Duration) -> bool {
    match last_refreshed {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= interval,
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    intervals: BTreeMap<MetricCategory, Duration>,
    last_refreshed: BTreeMap<MetricCategory, Instant>,
}

impl Scheduler {
    pub fn new(intervals: BTreeMap<MetricCategory, Duration>) -> Self {
        Self {
            intervals,
            last_refreshed: BTreeMap::new(),
        }
    }

    pub fn last_refreshed(&self, category: MetricCategory) -> Option<Instant> {
        self.last_refreshed.get(&category).copied()
    }

    /// Scheduled categories that are due at `now`, in category order
    pub fn due_categories(&self, now: Instant) -> Vec<MetricCategory> {
        self.intervals
            .iter()
            .filter(|(category, interval)| due(now, self.last_refreshed(**category), **interval))
            .map(|(category, _)| *category)
            .collect()
    }

    /// Record that `category` was sampled by the tick that started at `at`.
    ///
    /// Uses the tick start rather than the completion time so the sampling
    /// cost does not push the next refresh back by a whole tick.
    pub fn mark_refreshed(&mut self, category: MetricCategory, at: Instant) {
        self.last_refreshed.insert(category, at);
    }
}
