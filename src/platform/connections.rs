use std::collections::HashMap;
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::group_monitor::ConnectionSource;
use crate::error::{MonitorError, Result};

static SS_PID: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"pid=(\d+)").ok());

/// Count `TCP` rows of `netstat -ano` output by their trailing pid column
pub fn parse_netstat(output: &str) -> HashMap<u32, usize> {
    let mut table = HashMap::new();
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let Some(proto) = fields.next() else { continue };
        if !proto.eq_ignore_ascii_case("TCP") {
            continue;
        }
        if let Some(pid) = fields.last().and_then(|f| f.parse::<u32>().ok()) {
            *table.entry(pid).or_insert(0) += 1;
        }
    }
    table
}

/// Count `ss -tanp` rows per owning pid. A socket shared by several
/// processes counts once for each of them.
pub fn parse_ss(output: &str) -> HashMap<u32, usize> {
    let mut table = HashMap::new();
    let Some(pid_pattern) = SS_PID.as_ref() else {
        return table;
    };
    for line in output.lines().skip(1) {
        let mut seen = Vec::new();
        for caps in pid_pattern.captures_iter(line) {
            if let Ok(pid) = caps[1].parse::<u32>() {
                if !seen.contains(&pid) {
                    seen.push(pid);
                    *table.entry(pid).or_insert(0) += 1;
                }
            }
        }
    }
    table
}

/// Connection table from the system's socket listing tool
#[derive(Debug, Default)]
pub struct NetstatConnectionSource;

impl NetstatConnectionSource {
    pub fn new() -> Self {
        Self
    }
}

impl ConnectionSource for NetstatConnectionSource {
    #[cfg(windows)]
    fn tcp_connections_by_pid(&mut self) -> Result<HashMap<u32, usize>> {
        let output = run("netstat", &["-ano"])?;
        Ok(parse_netstat(&output))
    }

    #[cfg(not(windows))]
    fn tcp_connections_by_pid(&mut self) -> Result<HashMap<u32, usize>> {
        let output = run("ss", &["-tanp"])?;
        Ok(parse_ss(&output))
    }
}

fn run(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program).args(args).output().map_err(|e| {
        MonitorError::metric_collection(format!("Failed to run {}: {}", program, e))
    })?;

    if !output.status.success() {
        return Err(MonitorError::metric_collection(format!(
            "{} exited with {}",
            program, output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
