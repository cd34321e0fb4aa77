/// Dashboard projection of the snapshot
///
/// Composes the static host facts with the latest per-category values and
/// formats units for display. A category that failed or was never sampled
/// is reported with an explicit status marker, never as zeros.

use serde::Serialize;
use std::time::Duration;

use crate::core::payload::{
    ContainerStats, CpuStats, DiskIoRates, DiskStats, GpuStats, MemoryStats, NetworkRates, Payload, ProcessStats,
};
use crate::core::snapshot::{Failure, FailureReason};
use crate::core::{HostFacts, MetricCategory, MetricValue, SamplerConfig, Snapshot};
use crate::utils::{format_bytes, format_frequency, format_mib, format_rate, round1};

/// Why a category has no data to show
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Marker {
    pub fn pending() -> Self {
        Self {
            status: "pending",
            detail: Some("not yet collected".to_string()),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: "error",
            detail: Some(detail.into()),
        }
    }

    fn from_failure(failure: &Failure) -> Self {
        Self {
            status: status_name(failure.reason),
            detail: failure.detail.clone(),
        }
    }
}

fn status_name(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::Unavailable => "unavailable",
        FailureReason::Transient => "error",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum View<T> {
    Ready(T),
    Missing(Marker),
}

// ============================================================================
// Category views
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuView {
    pub usage: f64,
    pub per_core: Vec<f64>,
    pub name: String,
    pub frequency: String,
    pub max_frequency: String,
    pub count: usize,
    pub physical_cores: Option<usize>,
    pub tasks: Option<u64>,
    pub running: Option<u64>,
    pub load_average: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryView {
    pub percent: f64,
    pub used: String,
    pub total: String,
    pub available: String,
    pub swap_total: String,
    pub swap_used: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskView {
    pub mountpoint: String,
    pub device: String,
    pub file_system: String,
    pub percent: f64,
    pub used: String,
    pub total: String,
    pub free: String,
    pub remote: bool,
    pub removable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskIoView {
    pub read: String,
    pub write: String,
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkView {
    pub sent: String,
    pub recv: String,
    pub sent_bytes_per_sec: f64,
    pub recv_bytes_per_sec: f64,
    pub total_sent: String,
    pub total_recv: String,
    pub interfaces: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuView {
    pub index: u32,
    pub name: String,
    pub percent: f64,
    pub memory_used: String,
    pub memory_total: String,
    pub memory_percent: f64,
    pub temperature: Option<f64>,
    pub driver: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessView {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerView {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub cpu_percent: Option<f64>,
    pub memory: Option<String>,
    pub memory_limit: Option<String>,
    pub memory_percent: Option<f64>,
    pub net_rx: Option<String>,
    pub net_tx: Option<String>,
}

/// Full response of `GET /metrics`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub timestamp: Option<i64>,
    pub generation: u64,
    pub hostname: Option<String>,
    pub disks: Vec<String>,
    pub cpu: View<CpuView>,
    pub memory: View<MemoryView>,
    pub disk: View<DiskView>,
    pub disk_io: View<DiskIoView>,
    pub network: View<NetworkView>,
    pub gpu: View<Vec<GpuView>>,
    pub top_processes: View<Vec<ProcessView>>,
    pub containers: View<Vec<ContainerView>>,
}

// ============================================================================
// Projection
// ============================================================================

/// Project one category, mapping failures and gaps to markers
fn project<T, F>(snapshot: &Snapshot, category: MetricCategory, render: F) -> View<T>
where
    F: FnOnce(&Payload) -> Result<T, Marker>,
{
    match snapshot.value(category) {
        None => View::Missing(Marker::pending()),
        Some(MetricValue::Failed(failure)) => View::Missing(Marker::from_failure(failure)),
        Some(MetricValue::Ok(payload)) => match render(payload) {
            Ok(view) => View::Ready(view),
            Err(marker) => View::Missing(marker),
        },
    }
}

fn mismatch(category: MetricCategory) -> Marker {
    Marker::error(format!("unexpected payload for {}", category))
}

pub fn dashboard(snapshot: &Snapshot, facts: &HostFacts, disk: Option<&str>) -> Dashboard {
    Dashboard {
        timestamp: snapshot.updated_at.map(|t| t.timestamp_millis()),
        generation: snapshot.generation,
        hostname: facts.hostname.clone(),
        disks: mount_points(snapshot),
        cpu: project(snapshot, MetricCategory::Cpu, |p| match p {
            Payload::Cpu(stats) => Ok(cpu_view(stats, facts)),
            _ => Err(mismatch(MetricCategory::Cpu)),
        }),
        memory: project(snapshot, MetricCategory::Memory, |p| match p {
            Payload::Memory(stats) => Ok(memory_view(stats)),
            _ => Err(mismatch(MetricCategory::Memory)),
        }),
        disk: project(snapshot, MetricCategory::Disk, |p| match p {
            Payload::Disk(disks) => select_disk(disks, disk).map(disk_view),
            _ => Err(mismatch(MetricCategory::Disk)),
        }),
        disk_io: project(snapshot, MetricCategory::DiskIo, |p| match p {
            Payload::DiskIo(rates) => Ok(disk_io_view(rates)),
            _ => Err(mismatch(MetricCategory::DiskIo)),
        }),
        network: project(snapshot, MetricCategory::Network, |p| match p {
            Payload::Network(rates) => Ok(network_view(rates)),
            _ => Err(mismatch(MetricCategory::Network)),
        }),
        gpu: project(snapshot, MetricCategory::Gpu, |p| match p {
            Payload::Gpu(gpus) => Ok(gpus.iter().map(gpu_view).collect()),
            _ => Err(mismatch(MetricCategory::Gpu)),
        }),
        top_processes: project(snapshot, MetricCategory::TopProcesses, |p| match p {
            Payload::TopProcesses(processes) => Ok(processes.iter().map(process_view).collect()),
            _ => Err(mismatch(MetricCategory::TopProcesses)),
        }),
        containers: project(snapshot, MetricCategory::Containers, |p| match p {
            Payload::Containers(containers) => Ok(containers.iter().map(container_view).collect()),
            _ => Err(mismatch(MetricCategory::Containers)),
        }),
    }
}

/// Mount points known from the latest successful disk sample
pub fn mount_points(snapshot: &Snapshot) -> Vec<String> {
    match snapshot.value(MetricCategory::Disk).and_then(MetricValue::payload) {
        Some(Payload::Disk(disks)) => disks.iter().map(|d| d.mount_point.clone()).collect(),
        _ => Vec::new(),
    }
}

/// Requested mount point, else "/", else the first disk
fn select_disk<'a>(disks: &'a [DiskStats], requested: Option<&str>) -> Result<&'a DiskStats, Marker> {
    match requested.filter(|r| !r.is_empty()) {
        Some(mount) => disks
            .iter()
            .find(|d| d.mount_point == mount)
            .ok_or_else(|| Marker::error(format!("no disk mounted at {}", mount))),
        None => disks
            .iter()
            .find(|d| d.mount_point == "/")
            .or_else(|| disks.first())
            .ok_or_else(|| Marker::error("no disks reported")),
    }
}

fn cpu_view(stats: &CpuStats, facts: &HostFacts) -> CpuView {
    let [one, five, fifteen] = stats.load_average;

    CpuView {
        usage: round1(stats.usage_percent as f64),
        per_core: stats.per_core_percent.iter().map(|u| round1(*u as f64)).collect(),
        name: facts.cpu.brand.clone(),
        frequency: format_frequency(stats.frequency_mhz),
        max_frequency: format_frequency(facts.cpu.max_frequency_mhz),
        count: facts.cpu.logical_cores,
        physical_cores: facts.cpu.physical_cores,
        tasks: stats.tasks,
        running: stats.running,
        load_average: format!("{:.2}, {:.2}, {:.2}", one, five, fifteen),
    }
}

fn memory_view(stats: &MemoryStats) -> MemoryView {
    MemoryView {
        percent: round1(stats.percent),
        used: format_bytes(stats.used_bytes),
        total: format_bytes(stats.total_bytes),
        available: format_bytes(stats.available_bytes),
        swap_total: format_bytes(stats.swap_total_bytes),
        swap_used: format_bytes(stats.swap_used_bytes),
    }
}

fn disk_view(disk: &DiskStats) -> DiskView {
    DiskView {
        mountpoint: disk.mount_point.clone(),
        device: disk.device.clone(),
        file_system: disk.file_system.clone(),
        percent: round1(disk.percent),
        used: format_bytes(disk.used_bytes),
        total: format_bytes(disk.total_bytes),
        free: format_bytes(disk.free_bytes),
        remote: disk.remote,
        removable: disk.removable,
    }
}

fn disk_io_view(rates: &DiskIoRates) -> DiskIoView {
    DiskIoView {
        read: format_rate(rates.read_bytes_per_sec),
        write: format_rate(rates.write_bytes_per_sec),
        read_bytes_per_sec: rates.read_bytes_per_sec,
        write_bytes_per_sec: rates.write_bytes_per_sec,
    }
}

fn network_view(rates: &NetworkRates) -> NetworkView {
    NetworkView {
        sent: format_rate(rates.sent_bytes_per_sec),
        recv: format_rate(rates.recv_bytes_per_sec),
        sent_bytes_per_sec: rates.sent_bytes_per_sec,
        recv_bytes_per_sec: rates.recv_bytes_per_sec,
        total_sent: format_bytes(rates.total_sent_bytes),
        total_recv: format_bytes(rates.total_recv_bytes),
        interfaces: rates.interfaces,
    }
}

fn gpu_view(gpu: &GpuStats) -> GpuView {
    let memory_percent = if gpu.memory_total_mib > 0.0 {
        round1(gpu.memory_used_mib / gpu.memory_total_mib * 100.0)
    } else {
        0.0
    };

    GpuView {
        index: gpu.index,
        name: gpu.name.clone(),
        percent: round1(gpu.utilization_percent),
        memory_used: format_mib(gpu.memory_used_mib),
        memory_total: format_mib(gpu.memory_total_mib),
        memory_percent,
        temperature: gpu.temperature_c,
        driver: gpu.driver_version.clone(),
    }
}

fn process_view(process: &ProcessStats) -> ProcessView {
    ProcessView {
        pid: process.pid,
        name: process.name.clone(),
        cpu_percent: round1(process.cpu_percent as f64),
        memory: format_bytes(process.memory_bytes),
        status: process.status.clone(),
    }
}

fn container_view(container: &ContainerStats) -> ContainerView {
    let usage = container.usage.as_ref();

    ContainerView {
        id: container.id.chars().take(12).collect(),
        name: container.name.clone(),
        image: container.image.clone(),
        state: container.state.clone(),
        status: container.status.clone(),
        cpu_percent: usage.map(|u| round1(u.cpu_percent)),
        memory: usage.map(|u| format_bytes(u.memory_usage_bytes)),
        memory_limit: usage.map(|u| format_bytes(u.memory_limit_bytes)),
        memory_percent: usage.map(|u| round1(u.memory_percent)),
        net_rx: usage.map(|u| format_bytes(u.network_rx_bytes)),
        net_tx: usage.map(|u| format_bytes(u.network_tx_bytes)),
    }
}

// ============================================================================
// Sampler diagnostics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStatus {
    pub category: MetricCategory,
    pub interval_ms: Option<u64>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub collected_at: Option<String>,
    pub duration_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerStatus {
    pub base_interval_ms: u64,
    pub source_timeout_ms: u64,
    pub generation: u64,
    pub updated_at: Option<String>,
    pub categories: Vec<CategoryStatus>,
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

pub fn sampler_status(snapshot: &Snapshot, config: &SamplerConfig) -> SamplerStatus {
    let categories = MetricCategory::ALL
        .iter()
        .map(|category| {
            let entry = snapshot.get(*category);
            let (status, detail) = match entry.map(|e| &e.value) {
                None => ("pending", None),
                Some(MetricValue::Ok(_)) => ("ok", None),
                Some(MetricValue::Failed(failure)) => (status_name(failure.reason), failure.detail.clone()),
            };

            CategoryStatus {
                category: *category,
                interval_ms: config.intervals.get(category).map(|i| millis(*i)),
                status,
                detail,
                collected_at: entry.map(|e| e.collected_at.to_rfc3339()),
                duration_ms: entry.map(|e| e.duration.as_secs_f64() * 1000.0),
            }
        })
        .collect();

    SamplerStatus {
        base_interval_ms: millis(config.base_interval),
        source_timeout_ms: millis(config.source_timeout),
        generation: snapshot.generation,
        updated_at: snapshot.updated_at.map(|t| t.to_rfc3339()),
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::facts::CpuFacts;
    use crate::core::payload::ContainerUsage;
    use crate::core::snapshot::{CategoryEntry, SnapshotStore};
    use chrono::Utc;

    fn facts() -> HostFacts {
        HostFacts {
            hostname: Some("box".to_string()),
            os_name: Some("Linux".to_string()),
            os_version: None,
            kernel_version: None,
            cpu: CpuFacts {
                brand: "Test CPU".to_string(),
                vendor: "GenuineTest".to_string(),
                logical_cores: 8,
                physical_cores: Some(4),
                max_frequency_mhz: 3600,
            },
            total_memory_bytes: 16 << 30,
            total_swap_bytes: 0,
            boot_time: 0,
            monitor_version: "test".to_string(),
        }
    }

    fn entry(value: MetricValue) -> CategoryEntry {
        CategoryEntry::new(value, Utc::now(), Duration::from_millis(4))
    }

    fn disk(mount: &str, percent: f64) -> DiskStats {
        DiskStats {
            device: format!("/dev/{}", mount.trim_start_matches('/')),
            mount_point: mount.to_string(),
            file_system: "ext4".to_string(),
            total_bytes: 1 << 30,
            used_bytes: 1 << 29,
            free_bytes: 1 << 29,
            percent,
            removable: false,
            remote: false,
        }
    }

    fn store_with_disks() -> SnapshotStore {
        let store = SnapshotStore::new();
        store.merge([(
            MetricCategory::Disk,
            entry(MetricValue::Ok(Payload::Disk(vec![disk("/", 50.0), disk("/data", 75.0)]))),
        )]);
        store
    }

    #[test]
    fn test_empty_snapshot_is_all_pending() {
        let view = dashboard(&Snapshot::default(), &facts(), None);
        assert_eq!(view.cpu, View::Missing(Marker::pending()));
        assert_eq!(view.containers, View::Missing(Marker::pending()));
        assert!(view.timestamp.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["memory"]["status"], "pending");
        assert!(json["memory"].get("percent").is_none());
    }

    #[test]
    fn test_failure_is_marker_not_zero() {
        let store = SnapshotStore::new();
        store.merge([(
            MetricCategory::Gpu,
            entry(MetricValue::Failed(Failure::unavailable("nvidia-smi not found"))),
        )]);

        let json = serde_json::to_value(dashboard(&store.read(), &facts(), None)).unwrap();
        assert_eq!(json["gpu"]["status"], "unavailable");
        assert_eq!(json["gpu"]["detail"], "nvidia-smi not found");
    }

    #[test]
    fn test_transient_failure_is_error() {
        let store = SnapshotStore::new();
        store.merge([(MetricCategory::Containers, entry(MetricValue::Failed(Failure::transient("timed out"))))]);

        let view = dashboard(&store.read(), &facts(), None);
        match view.containers {
            View::Missing(marker) => assert_eq!(marker.status, "error"),
            View::Ready(_) => panic!("expected marker"),
        }
    }

    #[test]
    fn test_disk_selection() {
        let store = store_with_disks();
        let snapshot = store.read();

        match dashboard(&snapshot, &facts(), None).disk {
            View::Ready(view) => assert_eq!(view.mountpoint, "/"),
            other => panic!("unexpected disk view: {:?}", other),
        }
        match dashboard(&snapshot, &facts(), Some("/data")).disk {
            View::Ready(view) => assert_eq!(view.percent, 75.0),
            other => panic!("unexpected disk view: {:?}", other),
        }
        match dashboard(&snapshot, &facts(), Some("/missing")).disk {
            View::Missing(marker) => assert_eq!(marker.status, "error"),
            other => panic!("unexpected disk view: {:?}", other),
        }

        assert_eq!(mount_points(&snapshot), vec!["/".to_string(), "/data".to_string()]);
    }

    #[test]
    fn test_cpu_view_composes_static_facts() {
        let store = SnapshotStore::new();
        store.merge([(
            MetricCategory::Cpu,
            entry(MetricValue::Ok(Payload::Cpu(CpuStats {
                usage_percent: 12.34,
                per_core_percent: vec![10.0, 14.68],
                frequency_mhz: 2400,
                load_average: [0.5, 0.25, 0.13],
                running: Some(2),
                tasks: Some(300),
            }))),
        )]);

        match dashboard(&store.read(), &facts(), None).cpu {
            View::Ready(cpu) => {
                assert_eq!(cpu.usage, 12.3);
                assert_eq!(cpu.name, "Test CPU");
                assert_eq!(cpu.count, 8);
                assert_eq!(cpu.frequency, "2.40 GHz");
                assert_eq!(cpu.load_average, "0.50, 0.25, 0.13");
                assert_eq!(cpu.per_core, vec![10.0, 14.7]);
            }
            other => panic!("unexpected cpu view: {:?}", other),
        }
    }

    #[test]
    fn test_disk_io_rates_formatted() {
        let store = SnapshotStore::new();
        store.merge([(
            MetricCategory::DiskIo,
            entry(MetricValue::Ok(Payload::DiskIo(DiskIoRates {
                read_bytes_per_sec: 1000.0,
                write_bytes_per_sec: 0.0,
            }))),
        )]);

        match dashboard(&store.read(), &facts(), None).disk_io {
            View::Ready(io) => {
                assert_eq!(io.read, "1000 B/s");
                assert_eq!(io.write, "0 B/s");
            }
            other => panic!("unexpected disk_io view: {:?}", other),
        }
    }

    #[test]
    fn test_container_without_usage() {
        let view = container_view(&ContainerStats {
            id: "0123456789abcdef".to_string(),
            name: "web".to_string(),
            image: "nginx".to_string(),
            state: "running".to_string(),
            status: "Up 5 minutes".to_string(),
            usage: None,
        });
        assert_eq!(view.id, "0123456789ab");
        assert!(view.cpu_percent.is_none());

        let with_usage = container_view(&ContainerStats {
            usage: Some(ContainerUsage {
                cpu_percent: 3.14159,
                memory_usage_bytes: 1 << 20,
                memory_limit_bytes: 1 << 30,
                memory_percent: 0.09765625,
                network_rx_bytes: 2048,
                network_tx_bytes: 0,
            }),
            ..ContainerStats {
                id: "abc".to_string(),
                name: "db".to_string(),
                image: "postgres".to_string(),
                state: "running".to_string(),
                status: "Up".to_string(),
                usage: None,
            }
        });
        assert_eq!(with_usage.cpu_percent, Some(3.1));
        assert_eq!(with_usage.memory.as_deref(), Some("1.00 MB"));
    }

    #[test]
    fn test_sampler_status() {
        let store = store_with_disks();
        let status = sampler_status(&store.read(), &SamplerConfig::default());

        assert_eq!(status.base_interval_ms, 1000);
        assert_eq!(status.generation, 1);
        let disk = status.categories.iter().find(|c| c.category == MetricCategory::Disk).unwrap();
        assert_eq!(disk.status, "ok");
        assert_eq!(disk.interval_ms, Some(5000));
        assert!((disk.duration_ms.unwrap() - 4.0).abs() < 1e-9);
        let cpu = status.categories.iter().find(|c| c.category == MetricCategory::Cpu).unwrap();
        assert_eq!(cpu.status, "pending");
    }
}
