//! Process-group sampling engine.
//!
//! Periodically aggregates CPU, memory, disk, network and GPU usage of every
//! live process sharing one name, and keeps a bounded history of the results
//! for charts and exports.

mod collector;
pub mod export;
mod gpu;
mod history;
mod metrics;
mod scheduler;
mod session;
mod sources;

pub use collector::{
    cpu_usage_percent, read_group, Collaborators, CpuBaseline, CpuDeltaCollector, DiskIoCollector,
    GroupCollector, GroupTotals, NetworkCollector, BYTES_PER_MB, NETWORK_SCORE_PER_CONNECTION,
};
pub use export::{sample_to_csv, sample_to_json, write_csv, JsonLogWriter, CSV_HEADER};
pub use gpu::{
    GpuCollector, GpuLastKnown, GpuState, HardwareKind, SensorBackend, SensorHardware, SensorKind,
    SensorReading, GPU_CORE_SENSOR, GPU_MEMORY_USED_SENSOR,
};
pub use history::{
    BoundedSeries, ChartMetric, ChartSeriesBuffer, ChartWindow, SampleBuffer, SubscriptionId,
    CHART_WINDOW_CAPACITY, SAMPLE_HISTORY_CAPACITY,
};
pub use metrics::{timestamp_format, GpuReadings, MetricToggles, Sample, StaticSystemInfo};
pub use scheduler::{SamplingScheduler, SchedulerStats, TickGuard, TickPermit, TickState};
pub use session::{ProcessGroupMonitor, SessionInfo, SessionState};
pub use sources::{
    ConnectionSource, DiskIoCounter, DiskIoSource, ProcessHandle, ProcessSource, ProcessStats,
    SystemInfoSource,
};
