use std::collections::HashMap;

use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::core::group_monitor::{ProcessHandle, ProcessSource, ProcessStats};
use crate::error::{MonitorError, Result};

/// Strip a trailing `.exe` so `app` and `app.exe` name the same group
pub fn normalize_process_name(name: &str) -> &str {
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe") {
        &name[..len - 4]
    } else {
        name
    }
}

/// Whether a process called `candidate` belongs to the group `wanted`
pub fn name_matches(candidate: &str, wanted: &str) -> bool {
    let candidate = normalize_process_name(candidate);
    let wanted = normalize_process_name(wanted);
    if cfg!(windows) {
        candidate.eq_ignore_ascii_case(wanted)
    } else {
        candidate == wanted
    }
}

/// Sum of `Private_Clean` and `Private_Dirty` in a `smaps_rollup` file, in
/// bytes
pub fn parse_smaps_private(text: &str) -> Option<u64> {
    let mut total = None;
    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        if key == "Private_Clean" || key == "Private_Dirty" {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            total = Some(total.unwrap_or(0) + kb * 1024);
        }
    }
    total
}

/// Process table backed by `sysinfo`.
///
/// Private memory is `PrivateUsage` on Windows and the private pages of
/// `smaps_rollup` on Linux. Elsewhere, or when those are unreadable, it falls
/// back to the resident set. Thread counts come from a Toolhelp32 snapshot on
/// Windows and from `/proc` tasks on Linux; other systems report one thread
/// per process.
pub struct SysinfoProcessSource {
    system: System,
    // Refreshed once per enumeration on Windows
    thread_counts: HashMap<u32, u32>,
}

impl SysinfoProcessSource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            thread_counts: HashMap::new(),
        }
    }

    #[cfg(windows)]
    fn refresh_thread_counts(&mut self) {
        match super::windows::thread_counts() {
            Ok(counts) => self.thread_counts = counts,
            Err(e) => {
                log::debug!("{}", e);
                self.thread_counts.clear();
            }
        }
    }

    #[cfg(not(windows))]
    fn refresh_thread_counts(&mut self) {}

    fn thread_count(&self, proc: &Process) -> u32 {
        self.thread_counts
            .get(&proc.pid().as_u32())
            .copied()
            .or_else(|| proc.tasks().map(|tasks| tasks.len() as u32))
            .unwrap_or(1)
            .max(1)
    }

    fn read_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing()
            .with_cpu()
            .with_memory()
            .with_tasks()
    }
}

impl Default for SysinfoProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoProcessSource {
    fn processes_by_name(&mut self, name: &str) -> Vec<ProcessHandle> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );
        self.refresh_thread_counts();

        let mut group: Vec<ProcessHandle> = self
            .system
            .processes()
            .values()
            .filter_map(|proc| {
                let proc_name = proc.name().to_string_lossy();
                name_matches(&proc_name, name).then(|| ProcessHandle {
                    pid: proc.pid().as_u32(),
                    name: proc_name.into_owned(),
                })
            })
            .collect();
        group.sort_by_key(|h| h.pid);
        group
    }

    fn read(&mut self, handle: &ProcessHandle) -> Result<ProcessStats> {
        let pid = Pid::from_u32(handle.pid);
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, Self::read_kind());

        let proc = self.system.process(pid).ok_or_else(|| {
            MonitorError::process_read(format!("process {} is no longer running", handle.pid))
        })?;

        Ok(ProcessStats {
            cpu_time_ms: proc.accumulated_cpu_time(),
            working_set_bytes: proc.memory(),
            private_bytes: private_bytes(proc),
            thread_count: self.thread_count(proc),
        })
    }

    fn running_process_count(&mut self) -> usize {
        self.system.processes().len()
    }
}

#[cfg(windows)]
fn private_bytes(proc: &Process) -> u64 {
    super::windows::private_bytes(proc.pid().as_u32()).unwrap_or_else(|e| {
        log::debug!("{}", e);
        proc.memory()
    })
}

#[cfg(target_os = "linux")]
fn private_bytes(proc: &Process) -> u64 {
    let path = format!("/proc/{}/smaps_rollup", proc.pid().as_u32());
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| parse_smaps_private(&text))
        .unwrap_or_else(|| proc.memory())
}

#[cfg(not(any(windows, target_os = "linux")))]
fn private_bytes(proc: &Process) -> u64 {
    proc.memory()
}
