// Core business logic module

pub mod config;
pub mod group_monitor;

// Re-export commonly used items
pub use config::MonitorConfig;
pub use group_monitor::{MetricToggles, ProcessGroupMonitor, Sample};
