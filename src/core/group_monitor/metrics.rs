use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Metric families that can be switched on and off while a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricToggles {
    pub cpu: bool,
    pub memory: bool,
    pub disk: bool,
    pub network: bool,
    pub gpu: bool,
    /// Include static machine facts (cores, clock, caches, virtualization)
    pub advanced: bool,
}

impl MetricToggles {
    pub fn all() -> Self {
        Self {
            cpu: true,
            memory: true,
            disk: true,
            network: true,
            gpu: true,
            advanced: true,
        }
    }

    pub fn none() -> Self {
        Self {
            cpu: false,
            memory: false,
            disk: false,
            network: false,
            gpu: false,
            advanced: false,
        }
    }
}

impl Default for MetricToggles {
    fn default() -> Self {
        Self {
            cpu: true,
            memory: true,
            disk: true,
            network: true,
            gpu: false,
            advanced: false,
        }
    }
}

/// Machine facts captured once per session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticSystemInfo {
    pub physical_cores: u32,
    pub logical_processors: u32,
    pub clock_speed_mhz: u32,
    pub l1_cache_kb: u32,
    pub l2_cache_kb: u32,
    pub l3_cache_kb: u32,
    pub virtualization_enabled: bool,
}

impl StaticSystemInfo {
    pub fn virtualization_status(&self) -> &'static str {
        if self.virtualization_enabled {
            "Enabled"
        } else {
            "Disabled"
        }
    }
}

/// GPU values extracted from one sensor scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuReadings {
    pub usage_percent: f32,
    pub temperature_c: f32,
    pub clock_mhz: f32,
    pub memory_mb: f32,
}

/// One aggregated measurement of a process group, taken at one tick.
///
/// Field names serialize in the layout of the historical JSON log so that
/// existing consumers keep parsing it. Advanced and GPU fields are always
/// present and hold zero/empty values when their toggle is off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Sample {
    pub process_name: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub cpu_usage: f32,
    pub logical_processor_count: u32,
    pub physical_core_count: u32,
    #[serde(rename = "ClockSpeedMHz")]
    pub clock_speed_mhz: u32,
    pub virtualization_status: String,
    #[serde(rename = "L1CacheKB")]
    pub l1_cache_kb: u32,
    #[serde(rename = "L2CacheKB")]
    pub l2_cache_kb: u32,
    #[serde(rename = "L3CacheKB")]
    pub l3_cache_kb: u32,

    /// Working set, MB
    pub memory_usage: f32,
    pub private_memory_usage: f32,

    pub gpu_usage_percent: f32,
    pub gpu_temp_c: f32,
    #[serde(rename = "GpuClockMHz")]
    pub gpu_clock_mhz: f32,
    #[serde(rename = "GpuMemoryMB")]
    pub gpu_memory_mb: f32,

    /// MB/s
    #[serde(rename = "DiskIO")]
    pub disk_io: f32,
    /// Connection-count score, not a byte rate
    pub network_usage: f32,
    pub thread_count: u32,
    /// Processes running on the whole machine
    pub process_count: u32,

    /// Members of the group that were aggregated into this sample
    #[serde(skip)]
    pub group_size: u32,
}

impl Sample {
    /// An all-zero sample for `process_name` at `timestamp`
    pub fn empty(process_name: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            process_name: process_name.into(),
            timestamp,
            cpu_usage: 0.0,
            logical_processor_count: 0,
            physical_core_count: 0,
            clock_speed_mhz: 0,
            virtualization_status: String::new(),
            l1_cache_kb: 0,
            l2_cache_kb: 0,
            l3_cache_kb: 0,
            memory_usage: 0.0,
            private_memory_usage: 0.0,
            gpu_usage_percent: 0.0,
            gpu_temp_c: 0.0,
            gpu_clock_mhz: 0.0,
            gpu_memory_mb: 0.0,
            disk_io: 0.0,
            network_usage: 0.0,
            thread_count: 0,
            process_count: 0,
            group_size: 0,
        }
    }

    pub fn apply_static_info(&mut self, info: &StaticSystemInfo) {
        self.logical_processor_count = info.logical_processors;
        self.physical_core_count = info.physical_cores;
        self.clock_speed_mhz = info.clock_speed_mhz;
        self.virtualization_status = info.virtualization_status().to_string();
        self.l1_cache_kb = info.l1_cache_kb;
        self.l2_cache_kb = info.l2_cache_kb;
        self.l3_cache_kb = info.l3_cache_kb;
    }

    pub fn apply_gpu(&mut self, gpu: &GpuReadings) {
        self.gpu_usage_percent = gpu.usage_percent;
        self.gpu_temp_c = gpu.temperature_c;
        self.gpu_clock_mhz = gpu.clock_mhz;
        self.gpu_memory_mb = gpu.memory_mb;
    }

    pub fn gpu(&self) -> GpuReadings {
        GpuReadings {
            usage_percent: self.gpu_usage_percent,
            temperature_c: self.gpu_temp_c,
            clock_mhz: self.gpu_clock_mhz,
            memory_mb: self.gpu_memory_mb,
        }
    }
}

/// `yyyy-MM-dd HH:mm:ss` timestamps, as written by the CSV and JSON exports
pub mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
