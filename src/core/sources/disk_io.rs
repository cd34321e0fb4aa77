/// Block device read/write byte counters from /proc/diskstats

use async_trait::async_trait;

use super::{Reading, Source, SourceError};
use crate::core::category::MetricCategory;
use crate::core::rate::{counter_key, Counters};

const DISKSTATS_PATH: &str = "/proc/diskstats";
const SECTOR_SIZE: u64 = 512;

pub const READ_BYTES: &str = "read_bytes";
pub const WRITE_BYTES: &str = "write_bytes";

pub struct DiskIoSource {
    path: String,
}

impl DiskIoSource {
    pub fn new() -> Self {
        Self {
            path: DISKSTATS_PATH.to_string(),
        }
    }

    #[cfg(test)]
    fn with_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for DiskIoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for DiskIoSource {
    fn category(&self) -> MetricCategory {
        MetricCategory::DiskIo
    }

    async fn sample(&mut self) -> Result<Reading, SourceError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::Unavailable(format!(
                    "{} not present (disk I/O counters are Linux only)",
                    self.path
                )));
            }
            Err(e) => return Err(SourceError::Transient(format!("failed to read {}: {}", self.path, e))),
        };

        let (counters, devices) = parse_diskstats(&contents)?;
        Ok(Reading::Counters { counters, devices })
    }
}

/// Bytes read/written per whole disk, plus the number of disks
fn parse_diskstats(contents: &str) -> Result<(Counters, u64), SourceError> {
    let mut counters = Counters::new();
    let mut devices = 0u64;

    for line in contents.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        let device = parts[2];
        if !is_whole_disk(device) {
            continue;
        }

        let (Ok(sectors_read), Ok(sectors_written)) = (parts[5].parse::<u64>(), parts[9].parse::<u64>()) else {
            continue;
        };

        counters.insert(counter_key(device, READ_BYTES), sectors_read.saturating_mul(SECTOR_SIZE));
        counters.insert(counter_key(device, WRITE_BYTES), sectors_written.saturating_mul(SECTOR_SIZE));
        devices += 1;
    }

    if devices == 0 {
        return Err(SourceError::Unavailable("no block devices in diskstats".to_string()));
    }

    Ok((counters, devices))
}

/// Skip virtual devices and partitions so bytes are not counted twice
fn is_whole_disk(device: &str) -> bool {
    if ["loop", "ram", "dm-", "zram", "sr", "fd"].iter().any(|p| device.starts_with(p)) {
        return false;
    }

    if device.starts_with("nvme") || device.starts_with("mmcblk") {
        // nvme0n1 / mmcblk0 are disks, nvme0n1p1 / mmcblk0p1 are partitions
        let tail = device.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        return !tail.contains('p');
    }

    !device.ends_with(|c: char| c.is_ascii_digit())
}
