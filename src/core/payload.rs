/// Category payloads published in the snapshot
///
/// Values are kept raw (bytes, bytes per second, percent); unit formatting
/// happens in the query layer.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuStats {
    pub usage_percent: f32,
    pub per_core_percent: Vec<f32>,
    pub frequency_mhz: u64,
    pub load_average: [f64; 3],
    /// Runnable tasks, Linux only
    pub running: Option<u64>,
    /// Total scheduling entities, Linux only
    pub tasks: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub percent: f64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskStats {
    pub device: String,
    pub mount_point: String,
    pub file_system: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub percent: f64,
    pub removable: bool,
    pub remote: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskIoRates {
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkRates {
    pub sent_bytes_per_sec: f64,
    pub recv_bytes_per_sec: f64,
    pub total_sent_bytes: u64,
    pub total_recv_bytes: u64,
    pub interfaces: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuStats {
    pub index: u32,
    pub name: String,
    pub utilization_percent: f64,
    pub memory_used_mib: f64,
    pub memory_total_mib: f64,
    pub temperature_c: Option<f64>,
    pub driver_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessStats {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerStats {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    /// None when the daemon did not return stats for this container
    pub usage: Option<ContainerUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerUsage {
    pub cpu_percent: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub memory_percent: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
}

/// Successful result of one category
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Cpu(CpuStats),
    Memory(MemoryStats),
    Disk(Vec<DiskStats>),
    DiskIo(DiskIoRates),
    Network(NetworkRates),
    Gpu(Vec<GpuStats>),
    TopProcesses(Vec<ProcessStats>),
    Containers(Vec<ContainerStats>),
}

/// Percentage of `part` in `whole`, zero for an empty whole
pub fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
