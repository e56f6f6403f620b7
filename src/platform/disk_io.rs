use std::time::Instant;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use super::process::name_matches;
use crate::core::group_monitor::{DiskIoCounter, DiskIoSource};
use crate::error::{MonitorError, Result};

/// Opens per-name IO counters over the `sysinfo` process table
#[derive(Default)]
pub struct SysinfoDiskIoSource;

impl SysinfoDiskIoSource {
    pub fn new() -> Self {
        Self
    }
}

impl DiskIoSource for SysinfoDiskIoSource {
    fn open_counter(&mut self, process_name: &str) -> Result<Box<dyn DiskIoCounter>> {
        let mut counter = SysinfoDiskIoCounter {
            name: process_name.to_string(),
            system: System::new(),
            previous: None,
        };
        if counter.total_bytes().is_none() {
            return Err(MonitorError::metric_collection(format!(
                "no IO counter instance named '{}'",
                process_name
            )));
        }
        Ok(Box::new(counter))
    }
}

/// Read + write bytes of every same-named process, as a rate between calls
pub struct SysinfoDiskIoCounter {
    name: String,
    system: System,
    previous: Option<(u64, Instant)>,
}

impl SysinfoDiskIoCounter {
    /// Cumulative bytes moved by the group, `None` when no process matches
    fn total_bytes(&mut self) -> Option<u64> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_disk_usage(),
        );

        let mut found = false;
        let mut total = 0u64;
        for proc in self.system.processes().values() {
            if name_matches(&proc.name().to_string_lossy(), &self.name) {
                let usage = proc.disk_usage();
                total = total
                    .saturating_add(usage.total_read_bytes)
                    .saturating_add(usage.total_written_bytes);
                found = true;
            }
        }
        found.then_some(total)
    }
}

impl DiskIoCounter for SysinfoDiskIoCounter {
    fn instance_name(&self) -> &str {
        &self.name
    }

    fn next_value(&mut self) -> Result<f64> {
        let now = Instant::now();
        let total = self.total_bytes().unwrap_or(0);

        let rate = match self.previous {
            Some((bytes, at)) => {
                let elapsed = now.saturating_duration_since(at).as_secs_f64();
                if elapsed > 0.0 {
                    total.saturating_sub(bytes) as f64 / elapsed
                } else {
                    0.0
                }
            }
            // A fresh counter has nothing to diff against yet
            None => 0.0,
        };
        self.previous = Some((total, now));
        Ok(rate)
    }
}
