//! GPU sensor backends.
//!
//! NVIDIA devices are read through NVML; on Linux the DRM sysfs tree covers
//! AMD and Intel cards as well.

mod hwmon;
mod nvidia;

pub use hwmon::{HwmonSensorBackend, SysfsGpu, DRM_ROOT};
pub use nvidia::{NvidiaGpu, NvmlSensorBackend};

use crate::core::group_monitor::{SensorBackend, SensorHardware};
use crate::error::{MonitorError, Result};

/// Tries each backend in order and keeps the first that finds a GPU
pub struct ChainedSensorBackend {
    backends: Vec<Box<dyn SensorBackend>>,
}

impl ChainedSensorBackend {
    pub fn new(backends: Vec<Box<dyn SensorBackend>>) -> Self {
        Self { backends }
    }
}

impl SensorBackend for ChainedSensorBackend {
    fn open(&mut self) -> Result<Vec<Box<dyn SensorHardware>>> {
        let mut reasons = Vec::new();
        for backend in &mut self.backends {
            match backend.open() {
                Ok(hardware) if hardware.iter().any(|hw| hw.kind().is_gpu()) => {
                    return Ok(hardware);
                }
                Ok(_) => reasons.push("no GPU hardware".to_string()),
                Err(e) => reasons.push(e.to_string()),
            }
        }
        Err(MonitorError::gpu_not_available(if reasons.is_empty() {
            "No supported GPU backend".to_string()
        } else {
            reasons.join("; ")
        }))
    }
}

/// Backends in order of preference for this platform
pub fn default_sensor_backend() -> Box<dyn SensorBackend> {
    let mut backends: Vec<Box<dyn SensorBackend>> = Vec::new();

    if cfg!(feature = "nvml") {
        backends.push(Box::new(NvmlSensorBackend::new()));
    }
    if cfg!(target_os = "linux") {
        backends.push(Box::new(HwmonSensorBackend::new()));
    }

    Box::new(ChainedSensorBackend::new(backends))
}
