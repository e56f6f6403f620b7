use super::metrics::GpuReadings;
use crate::error::Result;

/// Sensor name used for the GPU core load, temperature and clock
pub const GPU_CORE_SENSOR: &str = "GPU Core";

/// Sensor name used for dedicated memory in use, MB
pub const GPU_MEMORY_USED_SENSOR: &str = "GPU Memory Used";

/// Class of a hardware instance exposed by a sensor backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareKind {
    GpuNvidia,
    GpuAmd,
    GpuIntel,
    Cpu,
    Motherboard,
    Other,
}

impl HardwareKind {
    pub fn is_gpu(self) -> bool {
        matches!(
            self,
            HardwareKind::GpuNvidia | HardwareKind::GpuAmd | HardwareKind::GpuIntel
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Load,
    Temperature,
    Clock,
    /// Small data quantities such as memory in MB
    SmallData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub kind: SensorKind,
    pub name: String,
    /// `None` when the sensor exists but reported nothing this refresh
    pub value: Option<f32>,
}

impl SensorReading {
    pub fn new(kind: SensorKind, name: impl Into<String>, value: Option<f32>) -> Self {
        Self {
            kind,
            name: name.into(),
            value,
        }
    }
}

/// One hardware instance with a refreshable set of sensors
pub trait SensorHardware: Send {
    fn kind(&self) -> HardwareKind;

    fn name(&self) -> &str;

    /// Refresh the sensor snapshot
    fn update(&mut self) -> Result<()>;

    fn sensors(&self) -> Vec<SensorReading>;
}

/// Hardware-sensor backend (NVML, sysfs hwmon, test fakes)
pub trait SensorBackend: Send {
    /// Enumerate every hardware instance the backend can see
    fn open(&mut self) -> Result<Vec<Box<dyn SensorHardware>>>;
}

/// Last values observed per GPU sensor. A sensor missing from a scan keeps
/// its previous value instead of dropping to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpuLastKnown {
    readings: GpuReadings,
}

impl GpuLastKnown {
    pub fn readings(&self) -> GpuReadings {
        self.readings
    }

    pub fn reset(&mut self) {
        self.readings = GpuReadings::default();
    }

    /// Fold one sensor scan into the last-known values
    pub fn merge(&mut self, sensors: &[SensorReading]) -> GpuReadings {
        for sensor in sensors {
            let Some(value) = sensor.value else { continue };
            match (sensor.kind, sensor.name.as_str()) {
                (SensorKind::Load, GPU_CORE_SENSOR) => self.readings.usage_percent = value,
                (SensorKind::Temperature, GPU_CORE_SENSOR) => self.readings.temperature_c = value,
                (SensorKind::Clock, GPU_CORE_SENSOR) => self.readings.clock_mhz = value,
                (SensorKind::SmallData, GPU_MEMORY_USED_SENSOR) => self.readings.memory_mb = value,
                _ => {}
            }
        }
        self.readings
    }
}

/// GPU capability for the current session
pub enum GpuState {
    /// Backend not opened yet this session
    NotOpened,
    Available(Box<dyn SensorHardware>),
    /// No GPU hardware found; stays this way until the next session
    Unavailable,
}

/// Reads the first GPU-class hardware of a [`SensorBackend`]
pub struct GpuCollector {
    backend: Box<dyn SensorBackend>,
    state: GpuState,
    last_known: GpuLastKnown,
}

impl GpuCollector {
    pub fn new(backend: Box<dyn SensorBackend>) -> Self {
        Self {
            backend,
            state: GpuState::NotOpened,
            last_known: GpuLastKnown::default(),
        }
    }

    /// Forget the hardware and last-known values of the previous session
    pub fn reset(&mut self) {
        self.state = GpuState::NotOpened;
        self.last_known.reset();
    }

    /// Open the backend once per session
    pub fn open(&mut self) {
        if !matches!(self.state, GpuState::NotOpened) {
            return;
        }

        let hardware = match self.backend.open() {
            Ok(list) => list.into_iter().find(|hw| hw.kind().is_gpu()),
            Err(e) => {
                log::debug!("Sensor backend failed to open: {}", e);
                None
            }
        };

        self.state = match hardware {
            Some(hw) => {
                log::info!("GPU sensors attached: {}", hw.name());
                GpuState::Available(hw)
            }
            None => {
                log::info!("No GPU hardware found, GPU metrics will report zero for this session");
                GpuState::Unavailable
            }
        };
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, GpuState::Available(_))
    }

    pub fn collect(&mut self) -> GpuReadings {
        self.open();

        match &mut self.state {
            GpuState::Available(hw) => {
                if let Err(e) = hw.update() {
                    log::debug!("GPU sensor refresh failed, keeping last values: {}", e);
                    return self.last_known.readings();
                }
                let sensors = hw.sensors();
                self.last_known.merge(&sensors)
            }
            GpuState::Unavailable | GpuState::NotOpened => GpuReadings::default(),
        }
    }
}
