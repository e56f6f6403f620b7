//! GPUs exposed through the Linux DRM sysfs tree.
//!
//! Reads `/sys/class/drm/cardN/device`: `gpu_busy_percent` and
//! `mem_info_vram_used` where the driver provides them (amdgpu), plus the
//! first `hwmon` directory for temperature and core clock.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::group_monitor::{
    HardwareKind, SensorBackend, SensorHardware, SensorKind, SensorReading, GPU_CORE_SENSOR,
    GPU_MEMORY_USED_SENSOR,
};
use crate::error::{MonitorError, Result};

pub const DRM_ROOT: &str = "/sys/class/drm";

const VENDOR_AMD: &str = "0x1002";
const VENDOR_NVIDIA: &str = "0x10de";
const VENDOR_INTEL: &str = "0x8086";

pub struct HwmonSensorBackend {
    root: PathBuf,
}

impl HwmonSensorBackend {
    pub fn new() -> Self {
        Self::with_root(DRM_ROOT)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for HwmonSensorBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBackend for HwmonSensorBackend {
    fn open(&mut self) -> Result<Vec<Box<dyn SensorHardware>>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            MonitorError::gpu_not_available(format!("Cannot read {:?}: {}", self.root, e))
        })?;

        let mut cards: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| is_card_dir(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path().join("device"))
            .collect();
        cards.sort();

        let mut hardware: Vec<Box<dyn SensorHardware>> = Vec::new();
        for device in cards {
            let Some(vendor) = read_trimmed(&device.join("vendor")) else {
                continue;
            };
            let kind = match vendor.as_str() {
                VENDOR_AMD => HardwareKind::GpuAmd,
                VENDOR_NVIDIA => HardwareKind::GpuNvidia,
                VENDOR_INTEL => HardwareKind::GpuIntel,
                _ => HardwareKind::Other,
            };
            let name = format!("{:?} ({})", kind, device.display());
            hardware.push(Box::new(SysfsGpu {
                device,
                kind,
                name,
                snapshot: Vec::new(),
            }));
        }
        Ok(hardware)
    }
}

/// `card0`, `card1`, ... but not connector entries like `card0-DP-1`
fn is_card_dir(name: &str) -> bool {
    name.strip_prefix("card")
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_number(path: &Path) -> Option<f64> {
    read_trimmed(path)?.parse::<f64>().ok()
}

fn first_hwmon_dir(device: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(device.join("hwmon"))
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    dirs.into_iter().next()
}

pub struct SysfsGpu {
    device: PathBuf,
    kind: HardwareKind,
    name: String,
    snapshot: Vec<SensorReading>,
}

impl SensorHardware for SysfsGpu {
    fn kind(&self) -> HardwareKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self) -> Result<()> {
        if !self.device.exists() {
            return Err(MonitorError::metric_collection(format!(
                "{:?} disappeared",
                self.device
            )));
        }

        let load = read_number(&self.device.join("gpu_busy_percent")).map(|v| v as f32);
        let memory_mb = read_number(&self.device.join("mem_info_vram_used"))
            .map(|bytes| (bytes / 1_048_576.0) as f32);

        let hwmon = first_hwmon_dir(&self.device);
        // millidegrees Celsius
        let temperature = hwmon
            .as_ref()
            .and_then(|dir| read_number(&dir.join("temp1_input")))
            .map(|v| (v / 1000.0) as f32);
        // Hz
        let clock = hwmon
            .as_ref()
            .and_then(|dir| read_number(&dir.join("freq1_input")))
            .map(|v| (v / 1_000_000.0) as f32);

        self.snapshot = vec![
            SensorReading::new(SensorKind::Load, GPU_CORE_SENSOR, load),
            SensorReading::new(SensorKind::Temperature, GPU_CORE_SENSOR, temperature),
            SensorReading::new(SensorKind::Clock, GPU_CORE_SENSOR, clock),
            SensorReading::new(SensorKind::SmallData, GPU_MEMORY_USED_SENSOR, memory_mb),
        ];
        Ok(())
    }

    fn sensors(&self) -> Vec<SensorReading> {
        self.snapshot.clone()
    }
}
