#[cfg(feature = "nvml")]
use nvml_wrapper::{
    enum_wrappers::device::{Clock, TemperatureSensor},
    Device, Nvml,
};
#[cfg(feature = "nvml")]
use once_cell::sync::Lazy;

use crate::core::group_monitor::{
    HardwareKind, SensorBackend, SensorHardware, SensorKind, SensorReading, GPU_CORE_SENSOR,
    GPU_MEMORY_USED_SENSOR,
};
use crate::error::{MonitorError, Result};

/// NVML may only be initialized once per process
#[cfg(feature = "nvml")]
static NVML: Lazy<Option<Nvml>> = Lazy::new(|| Nvml::init().ok());

/// NVIDIA GPUs through NVML
#[derive(Debug, Default)]
pub struct NvmlSensorBackend;

impl NvmlSensorBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SensorBackend for NvmlSensorBackend {
    #[cfg(feature = "nvml")]
    fn open(&mut self) -> Result<Vec<Box<dyn SensorHardware>>> {
        let nvml = NVML.as_ref().ok_or_else(|| {
            MonitorError::gpu_not_available(
                "NVML not available (NVIDIA driver not installed or incompatible)",
            )
        })?;

        let count = nvml.device_count().map_err(|e| {
            MonitorError::gpu_not_available(format!("Failed to count NVIDIA devices: {}", e))
        })?;

        let mut hardware: Vec<Box<dyn SensorHardware>> = Vec::new();
        for index in 0..count {
            match nvml.device_by_index(index) {
                Ok(device) => {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| "Unknown NVIDIA GPU".to_string());
                    hardware.push(Box::new(NvidiaGpu {
                        index,
                        name,
                        snapshot: Vec::new(),
                    }));
                }
                Err(e) => log::debug!("Skipping NVIDIA device {}: {}", index, e),
            }
        }
        Ok(hardware)
    }

    #[cfg(not(feature = "nvml"))]
    fn open(&mut self) -> Result<Vec<Box<dyn SensorHardware>>> {
        Err(MonitorError::gpu_not_available(
            "NVIDIA GPU support not enabled",
        ))
    }
}

/// One NVML device, looked up by index on every refresh
pub struct NvidiaGpu {
    #[cfg_attr(not(feature = "nvml"), allow(dead_code))]
    index: u32,
    name: String,
    snapshot: Vec<SensorReading>,
}

impl NvidiaGpu {
    #[cfg(feature = "nvml")]
    fn device(&self) -> Result<Device<'static>> {
        let nvml = NVML
            .as_ref()
            .ok_or_else(|| MonitorError::gpu_not_available("NVML not available"))?;
        nvml.device_by_index(self.index).map_err(|e| {
            MonitorError::metric_collection(format!("Failed to get GPU device: {}", e))
        })
    }
}

impl SensorHardware for NvidiaGpu {
    fn kind(&self) -> HardwareKind {
        HardwareKind::GpuNvidia
    }

    fn name(&self) -> &str {
        &self.name
    }

    #[cfg(feature = "nvml")]
    fn update(&mut self) -> Result<()> {
        let device = self.device()?;

        let load = device.utilization_rates().map(|u| u.gpu as f32).ok();
        let temperature = device
            .temperature(TemperatureSensor::Gpu)
            .map(|t| t as f32)
            .ok();
        let clock = device.clock_info(Clock::Graphics).map(|c| c as f32).ok();
        let memory_mb = device
            .memory_info()
            .map(|m| (m.used as f64 / 1_048_576.0) as f32)
            .ok();

        self.snapshot = vec![
            SensorReading::new(SensorKind::Load, GPU_CORE_SENSOR, load),
            SensorReading::new(SensorKind::Temperature, GPU_CORE_SENSOR, temperature),
            SensorReading::new(SensorKind::Clock, GPU_CORE_SENSOR, clock),
            SensorReading::new(SensorKind::SmallData, GPU_MEMORY_USED_SENSOR, memory_mb),
        ];
        Ok(())
    }

    #[cfg(not(feature = "nvml"))]
    fn update(&mut self) -> Result<()> {
        Err(MonitorError::gpu_not_available(
            "NVIDIA GPU support not enabled",
        ))
    }

    fn sensors(&self) -> Vec<SensorReading> {
        self.snapshot.clone()
    }
}
