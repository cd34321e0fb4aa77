/// Mounted file systems and their usage

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::Disks;

use super::{run_blocking, Reading, Source, SourceError};
use crate::core::category::MetricCategory;
use crate::core::payload::{percent_of, DiskStats, Payload};

/// File systems whose data lives on another host
const REMOTE_FILE_SYSTEMS: &[&str] = &[
    "nfs",
    "nfs4",
    "cifs",
    "smbfs",
    "smb3",
    "sshfs",
    "fuse.sshfs",
    "9p",
    "ceph",
    "glusterfs",
    "afs",
];

pub struct DiskSource {
    disks: Arc<Mutex<Disks>>,
}

impl DiskSource {
    pub fn new() -> Self {
        Self {
            disks: Arc::new(Mutex::new(Disks::new())),
        }
    }
}

impl Default for DiskSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for DiskSource {
    fn category(&self) -> MetricCategory {
        MetricCategory::Disk
    }

    async fn sample(&mut self) -> Result<Reading, SourceError> {
        run_blocking(&self.disks, |disks| {
            // Mounts come and go, so rebuild the list every time
            disks.refresh_list();

            let mut stats: Vec<DiskStats> = disks
                .list()
                .iter()
                .map(|disk| {
                    disk_stats(
                        disk.name().to_string_lossy().into_owned(),
                        disk.mount_point().to_string_lossy().into_owned(),
                        disk.file_system().to_string_lossy().into_owned(),
                        disk.total_space(),
                        disk.available_space(),
                        disk.is_removable(),
                    )
                })
                .collect();

            if stats.is_empty() {
                return Err(SourceError::Unavailable("no mounted disks reported".to_string()));
            }

            stats.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
            stats.dedup_by(|a, b| a.mount_point == b.mount_point);

            Ok(Reading::Value(Payload::Disk(stats)))
        })
        .await
    }
}

fn disk_stats(
    device: String,
    mount_point: String,
    file_system: String,
    total: u64,
    available: u64,
    removable: bool,
) -> DiskStats {
    let used = total.saturating_sub(available);
    let remote = is_remote_file_system(&file_system);

    DiskStats {
        device,
        mount_point,
        file_system,
        total_bytes: total,
        used_bytes: used,
        free_bytes: available,
        percent: percent_of(used, total),
        removable,
        remote,
    }
}

pub fn is_remote_file_system(file_system: &str) -> bool {
    let fs = file_system.to_lowercase();
    REMOTE_FILE_SYSTEMS.contains(&fs.as_str())
}
