/// Snapshot store shared between the sampler and the query interface
///
/// The store holds exactly one immutable `Snapshot` behind an `Arc`. A merge
/// builds the next snapshot and swaps it in under the write lock, so readers
/// see either the previous or the next snapshot, never a partial batch.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::category::MetricCategory;
use super::payload::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The platform feature, device or daemon does not exist here
    Unavailable,
    /// A source that normally works failed this cycle (includes timeouts)
    Transient,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub reason: FailureReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Failure {
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            reason: FailureReason::Unavailable,
            detail: Some(detail.into()),
        }
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            reason: FailureReason::Transient,
            detail: Some(detail.into()),
        }
    }
}

/// Published result for one category: a payload or a typed failure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Ok(Payload),
    Failed(Failure),
}

impl MetricValue {
    pub fn is_ok(&self) -> bool {
        matches!(self, MetricValue::Ok(_))
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            MetricValue::Ok(payload) => Some(payload),
            MetricValue::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            MetricValue::Ok(_) => None,
            MetricValue::Failed(failure) => Some(failure),
        }
    }
}

/// A category value together with when and how fast it was collected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryEntry {
    #[serde(flatten)]
    pub value: MetricValue,
    pub collected_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl CategoryEntry {
    pub fn new(value: MetricValue, collected_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            value,
            collected_at,
            duration,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

/// Most recently known value of every category sampled so far.
///
/// Categories that were never sampled are absent; callers must report them
/// as not collected rather than defaulting them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub generation: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub categories: BTreeMap<MetricCategory, CategoryEntry>,
}

impl Snapshot {
    pub fn get(&self, category: MetricCategory) -> Option<&CategoryEntry> {
        self.categories.get(&category)
    }

    pub fn value(&self, category: MetricCategory) -> Option<&MetricValue> {
        self.get(category).map(|entry| &entry.value)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Handle to the current snapshot. Cloning shares the same store.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    current: Arc<RwLock<Arc<Snapshot>>>,
    /// Serializes writers so the next snapshot is built outside the read path
    writer: Arc<Mutex<()>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest complete snapshot. Only holds the read lock for an `Arc` clone.
    pub fn read(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Apply a batch of category results as one atomic update.
    ///
    /// Only categories in the batch are replaced; the rest keep their last
    /// value. An empty batch leaves the snapshot untouched.
    pub fn merge<I>(&self, batch: I) -> Arc<Snapshot>
    where
        I: IntoIterator<Item = (MetricCategory, CategoryEntry)>,
    {
        let batch: Vec<_> = batch.into_iter().collect();
        if batch.is_empty() {
            return self.read();
        }

        let _writer = self.writer.lock();
        let mut next = Snapshot::clone(&self.read());
        for (category, entry) in batch {
            next.categories.insert(category, entry);
        }
        next.generation += 1;
        next.updated_at = Some(Utc::now());

        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload::{CpuStats, DiskIoRates};

    fn cpu(usage: f32) -> CategoryEntry {
        CategoryEntry::new(
            MetricValue::Ok(Payload::Cpu(CpuStats {
                usage_percent: usage,
                per_core_percent: vec![usage],
                frequency_mhz: 2400,
                load_average: [0.0; 3],
                running: None,
                tasks: None,
            })),
            Utc::now(),
            Duration::from_millis(3),
        )
    }

    fn disk_io(read: f64) -> CategoryEntry {
        CategoryEntry::new(
            MetricValue::Ok(Payload::DiskIo(DiskIoRates {
                read_bytes_per_sec: read,
                write_bytes_per_sec: read,
            })),
            Utc::now(),
            Duration::from_millis(1),
        )
    }

    fn usage(snapshot: &Snapshot) -> f32 {
        match snapshot.value(MetricCategory::Cpu) {
            Some(MetricValue::Ok(Payload::Cpu(stats))) => stats.usage_percent,
            other => panic!("unexpected cpu value: {:?}", other),
        }
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = SnapshotStore::new();
        let snapshot = store.read();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.generation, 0);
        assert!(snapshot.updated_at.is_none());
    }

    #[test]
    fn test_read_is_idempotent() {
        let store = SnapshotStore::new();
        store.merge([(MetricCategory::Cpu, cpu(12.5))]);

        let first = store.read();
        let second = store.read();
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_merge_keeps_categories_outside_batch() {
        let store = SnapshotStore::new();
        store.merge([(MetricCategory::Cpu, cpu(10.0)), (MetricCategory::DiskIo, disk_io(5.0))]);
        store.merge([(MetricCategory::Cpu, cpu(20.0))]);

        let snapshot = store.read();
        assert_eq!(usage(&snapshot), 20.0);
        assert!(snapshot.get(MetricCategory::DiskIo).is_some());
        assert_eq!(snapshot.generation, 2);
    }

    #[test]
    fn test_failure_replaces_previous_success() {
        let store = SnapshotStore::new();
        store.merge([(MetricCategory::Gpu, cpu(1.0))]);
        store.merge([(
            MetricCategory::Gpu,
            CategoryEntry::new(
                MetricValue::Failed(Failure::unavailable("nvidia-smi not found")),
                Utc::now(),
                Duration::ZERO,
            ),
        )]);

        let value = store.read().value(MetricCategory::Gpu).cloned().unwrap();
        assert_eq!(value.failure().map(|f| f.reason), Some(FailureReason::Unavailable));
    }

    #[test]
    fn test_empty_merge_is_noop() {
        let store = SnapshotStore::new();
        store.merge([(MetricCategory::Cpu, cpu(1.0))]);
        let before = store.read();
        store.merge(Vec::new());
        assert!(Arc::ptr_eq(&before, &store.read()));
    }

    #[test]
    fn test_old_snapshot_unchanged_after_merge() {
        let store = SnapshotStore::new();
        store.merge([(MetricCategory::Cpu, cpu(1.0))]);
        let held = store.read();

        store.merge([(MetricCategory::Cpu, cpu(99.0))]);
        assert_eq!(usage(&held), 1.0);
        assert_eq!(usage(&store.read()), 99.0);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_batch() {
        let store = SnapshotStore::new();
        let writer = store.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..2000 {
                let v = i as f32;
                writer.merge([(MetricCategory::Cpu, cpu(v)), (MetricCategory::DiskIo, disk_io(v as f64))]);
            }
        });

        let mut readers = Vec::new();
        for _ in 0..4 {
            let reader = store.clone();
            readers.push(std::thread::spawn(move || {
                for _ in 0..2000 {
                    let snapshot = reader.read();
                    let cpu = snapshot.value(MetricCategory::Cpu).and_then(|v| match v.payload() {
                        Some(Payload::Cpu(s)) => Some(s.usage_percent as f64),
                        _ => None,
                    });
                    let io = snapshot.value(MetricCategory::DiskIo).and_then(|v| match v.payload() {
                        Some(Payload::DiskIo(r)) => Some(r.read_bytes_per_sec),
                        _ => None,
                    });
                    assert_eq!(cpu, io);
                }
            }));
        }

        handle.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_read_not_blocked_while_next_snapshot_is_built() {
        let store = SnapshotStore::new();
        store.merge([(MetricCategory::Cpu, cpu(5.0))]);

        // A writer in the middle of building the next snapshot
        let building = store.writer.lock();
        assert!(store.current.try_read().is_some());
        assert_eq!(usage(&store.read()), 5.0);
        drop(building);
    }

    #[test]
    fn test_concurrent_writers_lose_no_updates() {
        let store = SnapshotStore::new();

        let writers: Vec<_> = [MetricCategory::Cpu, MetricCategory::DiskIo]
            .into_iter()
            .map(|category| {
                let writer = store.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let entry = match category {
                            MetricCategory::Cpu => cpu(i as f32),
                            _ => disk_io(i as f64),
                        };
                        writer.merge([(category, entry)]);
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }

        let snapshot = store.read();
        assert_eq!(snapshot.generation, 1000);
        assert_eq!(usage(&snapshot), 499.0);
        assert!(snapshot.get(MetricCategory::DiskIo).is_some());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let store = SnapshotStore::new();
        store.merge([(
            MetricCategory::Gpu,
            CategoryEntry::new(
                MetricValue::Failed(Failure::unavailable("no GPU")),
                Utc::now(),
                Duration::from_millis(2),
            ),
        )]);

        let json = serde_json::to_value(&*store.read()).unwrap();
        let gpu = &json["categories"]["gpu"];
        assert_eq!(gpu["status"], "failed");
        assert_eq!(gpu["value"]["reason"], "unavailable");
        assert_eq!(gpu["value"]["detail"], "no GPU");
        assert_eq!(gpu["duration"], 2.0);
    }
}
