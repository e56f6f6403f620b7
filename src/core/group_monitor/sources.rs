//! Collaborator interfaces the sampling engine reads from.
//!
//! Platform implementations live in `crate::platform`; tests substitute
//! deterministic fakes.

use std::collections::HashMap;

use super::metrics::StaticSystemInfo;
use crate::error::Result;

/// A live OS process that belongs to the monitored group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
}

/// Cumulative counters read from one process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// Total CPU time consumed since the process started
    pub cpu_time_ms: u64,
    pub working_set_bytes: u64,
    pub private_bytes: u64,
    pub thread_count: u32,
}

/// Process enumeration and per-process reads
pub trait ProcessSource: Send {
    /// Live processes whose name matches `name`. Instances are not
    /// deduplicated.
    fn processes_by_name(&mut self, name: &str) -> Vec<ProcessHandle>;

    /// Read one process. Fails if it exited or denies access.
    fn read(&mut self, handle: &ProcessHandle) -> Result<ProcessStats>;

    /// Number of processes running on the machine
    fn running_process_count(&mut self) -> usize;
}

/// IO rate counter bound to one process name
pub trait DiskIoCounter: Send {
    fn instance_name(&self) -> &str;

    /// Combined read + write rate in bytes per second
    fn next_value(&mut self) -> Result<f64>;
}

/// Opens [`DiskIoCounter`]s by process name
pub trait DiskIoSource: Send {
    fn open_counter(&mut self, process_name: &str) -> Result<Box<dyn DiskIoCounter>>;
}

/// Active TCP connections keyed by owning process id
pub trait ConnectionSource: Send {
    fn tcp_connections_by_pid(&mut self) -> Result<HashMap<u32, usize>>;
}

/// Static machine facts, gathered once per session
pub trait SystemInfoSource: Send {
    fn gather(&mut self) -> Result<StaticSystemInfo>;
}
