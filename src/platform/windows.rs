//! Win32 and WMI readers for values `sysinfo` does not expose on Windows

use std::collections::HashMap;
use std::mem;

use serde::Deserialize;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Thread32First, Thread32Next, TH32CS_SNAPTHREAD, THREADENTRY32,
};
use windows_sys::Win32::System::ProcessStatus::{
    GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS, PROCESS_MEMORY_COUNTERS_EX,
};
use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};
use wmi::WMIConnection;

use crate::error::{MonitorError, Result};

struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// Thread count of every process, from one Toolhelp32 snapshot
pub fn thread_counts() -> Result<HashMap<u32, u32>> {
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0) };
    if snapshot == INVALID_HANDLE_VALUE {
        return Err(MonitorError::metric_collection(format!(
            "Thread snapshot failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    let snapshot = OwnedHandle(snapshot);

    let mut entry: THREADENTRY32 = unsafe { mem::zeroed() };
    entry.dwSize = mem::size_of::<THREADENTRY32>() as u32;

    let mut counts = HashMap::new();
    let mut more = unsafe { Thread32First(snapshot.0, &mut entry) } != 0;
    while more {
        *counts.entry(entry.th32OwnerProcessID).or_insert(0) += 1;
        more = unsafe { Thread32Next(snapshot.0, &mut entry) } != 0;
    }
    Ok(counts)
}

/// Commit charge private to `pid` (`PrivateUsage`)
pub fn private_bytes(pid: u32) -> Result<u64> {
    let process = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
    if process.is_null() {
        return Err(MonitorError::process_read(format!(
            "Cannot open process {}: {}",
            pid,
            std::io::Error::last_os_error()
        )));
    }
    let process = OwnedHandle(process);

    let mut counters: PROCESS_MEMORY_COUNTERS_EX = unsafe { mem::zeroed() };
    counters.cb = mem::size_of::<PROCESS_MEMORY_COUNTERS_EX>() as u32;
    let ok = unsafe {
        GetProcessMemoryInfo(
            process.0,
            &mut counters as *mut PROCESS_MEMORY_COUNTERS_EX as *mut PROCESS_MEMORY_COUNTERS,
            counters.cb,
        )
    };
    if ok == 0 {
        return Err(MonitorError::process_read(format!(
            "Memory counters of process {} unavailable: {}",
            pid,
            std::io::Error::last_os_error()
        )));
    }
    Ok(counters.PrivateUsage as u64)
}

#[derive(Deserialize, Debug)]
#[serde(rename = "Win32_Processor")]
#[serde(rename_all = "PascalCase")]
struct Win32Processor {
    virtualization_firmware_enabled: Option<bool>,
}

/// Whether firmware has virtualization turned on for any processor
pub fn virtualization_firmware_enabled() -> Result<bool> {
    let wmi_con = WMIConnection::new().map_err(|e| {
        MonitorError::metric_collection(format!("Failed to connect to WMI: {}", e))
    })?;

    let processors: Vec<Win32Processor> = wmi_con
        .query()
        .map_err(|e| MonitorError::metric_collection(format!("WMI query failed: {}", e)))?;

    Ok(processors
        .iter()
        .any(|p| p.virtualization_firmware_enabled == Some(true)))
}
