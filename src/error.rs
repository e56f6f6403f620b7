use std::io;
use thiserror::Error;

/// Error type for the process-group monitor
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid sampling interval: {0} ms (must be greater than zero)")]
    InvalidInterval(u64),

    #[error("Process name must not be empty")]
    EmptyProcessName,

    #[error("A monitoring session is already running for '{0}'")]
    AlreadyRunning(String),

    #[error("No monitoring session is running")]
    NotRunning,

    #[error("Scheduler runtime error: {0}")]
    Runtime(String),

    #[error("Process read failed: {0}")]
    ProcessRead(String),

    #[error("GPU not available: {0}")]
    GpuNotAvailable(String),

    #[error("Metric collection failed: {0}")]
    MetricCollection(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for the monitor
pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        MonitorError::Runtime(msg.into())
    }

    /// Create a per-process read error (process exited or access denied)
    pub fn process_read<S: Into<String>>(msg: S) -> Self {
        MonitorError::ProcessRead(msg.into())
    }

    pub fn gpu_not_available<S: Into<String>>(msg: S) -> Self {
        MonitorError::GpuNotAvailable(msg.into())
    }

    pub fn metric_collection<S: Into<String>>(msg: S) -> Self {
        MonitorError::MetricCollection(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        MonitorError::Other(msg.into())
    }
}
