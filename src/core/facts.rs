/// Static host facts, collected once at startup
///
/// These never change while the process runs, so they live outside the
/// snapshot and the query layer composes them with the per-tick values.

use serde::Serialize;
use sysinfo::System;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuFacts {
    pub brand: String,
    pub vendor: String,
    pub logical_cores: usize,
    pub physical_cores: Option<usize>,
    pub max_frequency_mhz: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostFacts {
    pub hostname: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub cpu: CpuFacts,
    pub total_memory_bytes: u64,
    pub total_swap_bytes: u64,
    pub boot_time: u64,
    pub monitor_version: String,
}

impl HostFacts {
    pub fn collect() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        let cpus = system.cpus();
        let first = cpus.first();

        Self {
            hostname: System::host_name(),
            os_name: System::name(),
            os_version: System::long_os_version().or_else(System::os_version),
            kernel_version: System::kernel_version(),
            cpu: CpuFacts {
                brand: first
                    .map(|c| c.brand().trim().to_string())
                    .filter(|b| !b.is_empty())
                    .unwrap_or_else(|| "Unknown CPU".to_string()),
                vendor: first.map(|c| c.vendor_id().to_string()).unwrap_or_default(),
                logical_cores: cpus.len(),
                physical_cores: system.physical_core_count(),
                max_frequency_mhz: cpus.iter().map(|c| c.frequency()).max().unwrap_or(0),
            },
            total_memory_bytes: system.total_memory(),
            total_swap_bytes: system.total_swap(),
            boot_time: System::boot_time(),
            monitor_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
