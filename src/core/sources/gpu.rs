/// NVIDIA GPU utilization via nvidia-smi
///
/// Shells out the same way container sizes are read from the docker CLI.
/// The child is killed if the sampler's timeout drops the future.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::{Reading, Source, SourceError};
use crate::core::category::MetricCategory;
use crate::core::payload::{GpuStats, Payload};

const NVIDIA_SMI: &str = "nvidia-smi";
const QUERY: &str = "--query-gpu=index,name,utilization.gpu,memory.used,memory.total,temperature.gpu,driver_version";

pub struct GpuSource {
    binary: String,
}

impl GpuSource {
    pub fn new() -> Self {
        Self {
            binary: NVIDIA_SMI.to_string(),
        }
    }

    #[cfg(test)]
    fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for GpuSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for GpuSource {
    fn category(&self) -> MetricCategory {
        MetricCategory::Gpu
    }

    async fn sample(&mut self) -> Result<Reading, SourceError> {
        let output = Command::new(&self.binary)
            .args([QUERY, "--format=csv,noheader,nounits"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    SourceError::Unavailable(format!("{} not found, no NVIDIA GPU driver", self.binary))
                }
                std::io::ErrorKind::PermissionDenied => {
                    SourceError::Unavailable(format!("permission denied running {}", self.binary))
                }
                _ => SourceError::Transient(format!("failed to run {}: {}", self.binary, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = [stderr.trim(), stdout.trim()]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or("no output");
            return Err(SourceError::Unavailable(format!(
                "{} exited with {}: {}",
                self.binary, output.status, detail
            )));
        }

        let gpus = parse_gpu_csv(&String::from_utf8_lossy(&output.stdout))?;
        Ok(Reading::Value(Payload::Gpu(gpus)))
    }
}

/// Parse `nvidia-smi --format=csv,noheader,nounits` rows
fn parse_gpu_csv(output: &str) -> Result<Vec<GpuStats>, SourceError> {
    let mut gpus = Vec::new();

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 7 {
            return Err(SourceError::Transient(format!("unexpected nvidia-smi row: {}", line)));
        }

        let number = |idx: usize| -> Result<f64, SourceError> {
            fields[idx]
                .parse::<f64>()
                .map_err(|_| SourceError::Transient(format!("bad value '{}' in nvidia-smi row: {}", fields[idx], line)))
        };

        gpus.push(GpuStats {
            index: fields[0]
                .parse()
                .map_err(|_| SourceError::Transient(format!("bad GPU index in row: {}", line)))?,
            name: fields[1].to_string(),
            utilization_percent: number(2)?,
            memory_used_mib: number(3)?,
            memory_total_mib: number(4)?,
            // Some boards report "[N/A]" for temperature
            temperature_c: fields[5].parse().ok(),
            driver_version: fields[6].to_string(),
        });
    }

    if gpus.is_empty() {
        return Err(SourceError::Unavailable("nvidia-smi reported no GPUs".to_string()));
    }

    Ok(gpus)
}
