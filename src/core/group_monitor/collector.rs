use std::time::Instant;

use chrono::Local;

use super::gpu::{GpuCollector, SensorBackend};
use super::metrics::{MetricToggles, Sample, StaticSystemInfo};
use super::sources::{
    ConnectionSource, DiskIoCounter, DiskIoSource, ProcessHandle, ProcessSource, SystemInfoSource,
};
use crate::error::Result;

pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// Score added per open TCP connection. The network figure is a coarse
/// activity indicator, not a throughput measurement.
pub const NETWORK_SCORE_PER_CONNECTION: f32 = 10.0;

/// Everything the collector reads from the outside world
pub struct Collaborators {
    pub processes: Box<dyn ProcessSource>,
    pub disk_io: Box<dyn DiskIoSource>,
    pub connections: Box<dyn ConnectionSource>,
    pub sensors: Box<dyn SensorBackend>,
    pub system_info: Box<dyn SystemInfoSource>,
}

/// `(Δcpu / (Δwall × cores)) × 100`, zero for degenerate inputs
pub fn cpu_usage_percent(delta_cpu_ms: f64, delta_wall_ms: f64, core_count: u32) -> f32 {
    if delta_wall_ms <= 0.0 || delta_cpu_ms < 0.0 || core_count == 0 {
        return 0.0;
    }
    ((delta_cpu_ms / (delta_wall_ms * core_count as f64)) * 100.0) as f32
}

/// Group CPU time and wall clock of the previous observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuBaseline {
    pub cpu_time_ms: u64,
    pub taken_at: Instant,
}

#[derive(Debug, Default)]
pub struct CpuDeltaCollector {
    baseline: Option<CpuBaseline>,
    core_count: u32,
}

impl CpuDeltaCollector {
    pub fn new(core_count: u32) -> Self {
        Self {
            baseline: None,
            core_count,
        }
    }

    pub fn set_core_count(&mut self, core_count: u32) {
        self.core_count = core_count;
    }

    pub fn baseline(&self) -> Option<CpuBaseline> {
        self.baseline
    }

    pub fn reset(&mut self) {
        self.baseline = None;
    }

    /// Record `cpu_time_ms` at `now` and return the usage since the previous
    /// observation. The first observation only records the baseline.
    pub fn observe(&mut self, cpu_time_ms: u64, now: Instant) -> f32 {
        let current = CpuBaseline {
            cpu_time_ms,
            taken_at: now,
        };
        let Some(previous) = self.baseline.replace(current) else {
            return 0.0;
        };

        let delta_cpu = cpu_time_ms as f64 - previous.cpu_time_ms as f64;
        let delta_wall = now.saturating_duration_since(previous.taken_at).as_secs_f64() * 1000.0;
        cpu_usage_percent(delta_cpu, delta_wall, self.core_count)
    }
}

/// Disk IO rate via a counter that follows the monitored name
pub struct DiskIoCollector {
    source: Box<dyn DiskIoSource>,
    counter: Option<Box<dyn DiskIoCounter>>,
    warned: bool,
}

impl DiskIoCollector {
    pub fn new(source: Box<dyn DiskIoSource>) -> Self {
        Self {
            source,
            counter: None,
            warned: false,
        }
    }

    /// MB/s for `process_name`, zero when the counter is unavailable
    pub fn collect(&mut self, process_name: &str) -> f32 {
        match self.rate(process_name) {
            Ok(bytes_per_sec) => {
                self.warned = false;
                (bytes_per_sec.max(0.0) / BYTES_PER_MB) as f32
            }
            Err(e) => {
                if !self.warned {
                    log::warn!("Disk IO counter unavailable for '{}': {}", process_name, e);
                    self.warned = true;
                } else {
                    log::debug!("Disk IO counter still unavailable: {}", e);
                }
                0.0
            }
        }
    }

    fn rate(&mut self, process_name: &str) -> Result<f64> {
        let stale = self
            .counter
            .as_ref()
            .map_or(true, |c| c.instance_name() != process_name);
        if stale {
            self.counter = None;
            self.counter = Some(self.source.open_counter(process_name)?);
        }

        match self.counter.as_mut() {
            Some(counter) => counter.next_value(),
            None => Ok(0.0),
        }
    }
}

/// Connection-count heuristic for network activity
pub struct NetworkCollector {
    source: Box<dyn ConnectionSource>,
    warned: bool,
}

impl NetworkCollector {
    pub fn new(source: Box<dyn ConnectionSource>) -> Self {
        Self {
            source,
            warned: false,
        }
    }

    pub fn collect(&mut self, pids: &[u32]) -> f32 {
        match self.source.tcp_connections_by_pid() {
            Ok(table) => {
                self.warned = false;
                let connections: usize = pids.iter().filter_map(|pid| table.get(pid)).sum();
                connections as f32 * NETWORK_SCORE_PER_CONNECTION
            }
            Err(e) => {
                if !self.warned {
                    log::warn!("Connection table unavailable: {}", e);
                    self.warned = true;
                } else {
                    log::debug!("Connection table still unavailable: {}", e);
                }
                0.0
            }
        }
    }
}

/// Sums of the per-process reads that succeeded this tick
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GroupTotals {
    pub cpu_time_ms: u64,
    pub working_set_bytes: u64,
    pub private_bytes: u64,
    pub thread_count: u32,
    pub pids: Vec<u32>,
}

/// Read every handle; processes that exited or deny access are left out
pub fn read_group(source: &mut dyn ProcessSource, group: &[ProcessHandle]) -> GroupTotals {
    let mut totals = GroupTotals::default();
    for handle in group {
        match source.read(handle) {
            Ok(stats) => {
                totals.cpu_time_ms += stats.cpu_time_ms;
                totals.working_set_bytes += stats.working_set_bytes;
                totals.private_bytes += stats.private_bytes;
                totals.thread_count += stats.thread_count;
                totals.pids.push(handle.pid);
            }
            Err(e) => {
                log::debug!("Skipping {} (pid {}): {}", handle.name, handle.pid, e);
            }
        }
    }
    totals
}

/// Runs every collector for one tick and assembles the [`Sample`]
pub struct GroupCollector {
    processes: Box<dyn ProcessSource>,
    system_info: Box<dyn SystemInfoSource>,
    cpu: CpuDeltaCollector,
    disk: DiskIoCollector,
    network: NetworkCollector,
    gpu: GpuCollector,
    static_info: StaticSystemInfo,
}

impl GroupCollector {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            processes: collaborators.processes,
            system_info: collaborators.system_info,
            cpu: CpuDeltaCollector::new(fallback_core_count()),
            disk: DiskIoCollector::new(collaborators.disk_io),
            network: NetworkCollector::new(collaborators.connections),
            gpu: GpuCollector::new(collaborators.sensors),
            static_info: StaticSystemInfo::default(),
        }
    }

    /// Reset per-session state and capture static machine facts
    pub fn begin_session(&mut self, toggles: MetricToggles) {
        self.static_info = match self.system_info.gather() {
            Ok(info) => info,
            Err(e) => {
                log::warn!("Static system info unavailable: {}", e);
                StaticSystemInfo::default()
            }
        };
        if self.static_info.logical_processors == 0 {
            self.static_info.logical_processors = fallback_core_count();
        }

        self.cpu.reset();
        self.cpu.set_core_count(self.static_info.logical_processors);
        self.gpu.reset();
        if toggles.gpu {
            self.gpu.open();
        }
    }

    pub fn static_info(&self) -> &StaticSystemInfo {
        &self.static_info
    }

    /// Measure the group once. `None` when no live process matches.
    pub fn sample(&mut self, process_name: &str, toggles: MetricToggles) -> Option<Sample> {
        let group = self.processes.processes_by_name(process_name);
        if group.is_empty() {
            log::debug!("No live process named '{}', skipping tick", process_name);
            return None;
        }

        let totals = read_group(self.processes.as_mut(), &group);
        if totals.pids.is_empty() {
            log::debug!("Every '{}' process exited before it could be read", process_name);
            return None;
        }
        let now = Instant::now();

        let mut sample = Sample::empty(process_name, Local::now().naive_local());
        sample.group_size = totals.pids.len() as u32;
        sample.process_count = self.processes.running_process_count() as u32;

        if toggles.cpu {
            sample.cpu_usage = self.cpu.observe(totals.cpu_time_ms, now);
        } else {
            self.cpu.reset();
        }

        if toggles.memory {
            sample.memory_usage = (totals.working_set_bytes as f64 / BYTES_PER_MB) as f32;
            sample.private_memory_usage = (totals.private_bytes as f64 / BYTES_PER_MB) as f32;
            sample.thread_count = totals.thread_count;
        }

        if toggles.disk {
            sample.disk_io = self.disk.collect(process_name);
        }

        if toggles.network {
            sample.network_usage = self.network.collect(&totals.pids);
        }

        if toggles.gpu {
            sample.apply_gpu(&self.gpu.collect());
        }

        if toggles.advanced {
            sample.apply_static_info(&self.static_info);
        }

        Some(sample)
    }
}

fn fallback_core_count() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}
