// Platform-specific collaborators for the group monitor

pub mod connections;
pub mod disk_io;
pub mod gpu;
pub mod process;
pub mod system_info;
#[cfg(windows)]
pub mod windows;

// Re-exports para imports limpios
pub use connections::NetstatConnectionSource;
pub use disk_io::SysinfoDiskIoSource;
pub use gpu::{default_sensor_backend, ChainedSensorBackend};
pub use process::SysinfoProcessSource;
pub use system_info::SysinfoSystemInfoSource;

use crate::core::group_monitor::Collaborators;

/// Collaborators reading the host's process table, sockets and sensors
pub fn platform_collaborators() -> Collaborators {
    Collaborators {
        processes: Box::new(SysinfoProcessSource::new()),
        disk_io: Box::new(SysinfoDiskIoSource::new()),
        connections: Box::new(NetstatConnectionSource::new()),
        sensors: default_sensor_backend(),
        system_info: Box::new(SysinfoSystemInfoSource::new()),
    }
}
