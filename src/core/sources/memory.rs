/// Physical memory and swap

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::System;

use super::{run_blocking, Reading, Source, SourceError};
use crate::core::category::MetricCategory;
use crate::core::payload::{percent_of, MemoryStats, Payload};

pub struct MemorySource {
    system: Arc<Mutex<System>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for MemorySource {
    fn category(&self) -> MetricCategory {
        MetricCategory::Memory
    }

    async fn sample(&mut self) -> Result<Reading, SourceError> {
        run_blocking(&self.system, |system| {
            system.refresh_memory();

            let total = system.total_memory();
            if total == 0 {
                return Err(SourceError::Unavailable("total memory reported as zero".to_string()));
            }

            Ok(Reading::Value(Payload::Memory(memory_stats(
                total,
                system.used_memory(),
                system.available_memory(),
                system.total_swap(),
                system.used_swap(),
            ))))
        })
        .await
    }
}

fn memory_stats(total: u64, used: u64, available: u64, swap_total: u64, swap_used: u64) -> MemoryStats {
    MemoryStats {
        total_bytes: total,
        used_bytes: used,
        available_bytes: available,
        percent: percent_of(used, total),
        swap_total_bytes: swap_total,
        swap_used_bytes: swap_used,
    }
}
