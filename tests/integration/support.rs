use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pgmon::core::group_monitor::{
    Collaborators, ConnectionSource, DiskIoCounter, DiskIoSource, HardwareKind, ProcessHandle,
    ProcessSource, ProcessStats, SensorBackend, SensorHardware, SensorKind, SensorReading,
    StaticSystemInfo, SystemInfoSource, GPU_CORE_SENSOR, GPU_MEMORY_USED_SENSOR,
};
use pgmon::error::{MonitorError, Result};

pub const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FakeProcess {
    pub pid: u32,
    pub name: String,
    pub cpu_time_ms: u64,
    pub working_set_bytes: u64,
    pub private_bytes: u64,
    pub thread_count: u32,
    /// Reads fail as if the process exited between enumeration and read
    pub readable: bool,
}

impl FakeProcess {
    pub fn new(pid: u32, name: &str, working_set_mib: u64) -> Self {
        Self {
            pid,
            name: name.to_string(),
            cpu_time_ms: 0,
            working_set_bytes: working_set_mib * MIB,
            private_bytes: working_set_mib * MIB / 2,
            thread_count: 4,
            readable: true,
        }
    }
}

/// Mutable machine state shared by every fake collaborator
#[derive(Debug)]
pub struct World {
    pub processes: Vec<FakeProcess>,
    pub running_total: usize,
    /// Added to each process's CPU time on every enumeration
    pub cpu_step_ms: u64,
    pub disk_bytes_per_sec: f64,
    pub connections: HashMap<u32, usize>,
    pub gpu: Option<[f32; 4]>,
    /// Time each enumeration takes
    pub enumerate_delay: Duration,
    pub static_info: StaticSystemInfo,
}

impl Default for World {
    fn default() -> Self {
        Self {
            processes: Vec::new(),
            running_total: 180,
            cpu_step_ms: 0,
            disk_bytes_per_sec: 0.0,
            connections: HashMap::new(),
            gpu: None,
            enumerate_delay: Duration::ZERO,
            static_info: StaticSystemInfo {
                physical_cores: 4,
                logical_processors: 8,
                clock_speed_mhz: 3200,
                l1_cache_kb: 32,
                l2_cache_kb: 512,
                l3_cache_kb: 16384,
                virtualization_enabled: true,
            },
        }
    }
}

pub type SharedWorld = Arc<Mutex<World>>;

/// Concurrency probe around process enumeration
#[derive(Debug, Default)]
pub struct Probe {
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub enumerations: AtomicUsize,
}

pub struct FakeProcesses {
    world: SharedWorld,
    probe: Arc<Probe>,
}

impl ProcessSource for FakeProcesses {
    fn processes_by_name(&mut self, name: &str) -> Vec<ProcessHandle> {
        let now_active = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.probe.enumerations.fetch_add(1, Ordering::SeqCst);

        let delay = self.world.lock().enumerate_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let handles = {
            let mut world = self.world.lock();
            let step = world.cpu_step_ms;
            world
                .processes
                .iter_mut()
                .filter(|p| p.name == name)
                .map(|p| {
                    p.cpu_time_ms += step;
                    ProcessHandle {
                        pid: p.pid,
                        name: p.name.clone(),
                    }
                })
                .collect()
        };

        self.probe.active.fetch_sub(1, Ordering::SeqCst);
        handles
    }

    fn read(&mut self, handle: &ProcessHandle) -> Result<ProcessStats> {
        let world = self.world.lock();
        let process = world
            .processes
            .iter()
            .find(|p| p.pid == handle.pid && p.readable)
            .ok_or_else(|| MonitorError::process_read(format!("pid {} exited", handle.pid)))?;
        Ok(ProcessStats {
            cpu_time_ms: process.cpu_time_ms,
            working_set_bytes: process.working_set_bytes,
            private_bytes: process.private_bytes,
            thread_count: process.thread_count,
        })
    }

    fn running_process_count(&mut self) -> usize {
        self.world.lock().running_total
    }
}

struct FakeDiskCounter {
    name: String,
    world: SharedWorld,
}

impl DiskIoCounter for FakeDiskCounter {
    fn instance_name(&self) -> &str {
        &self.name
    }

    fn next_value(&mut self) -> Result<f64> {
        Ok(self.world.lock().disk_bytes_per_sec)
    }
}

struct FakeDisk {
    world: SharedWorld,
}

impl DiskIoSource for FakeDisk {
    fn open_counter(&mut self, process_name: &str) -> Result<Box<dyn DiskIoCounter>> {
        Ok(Box::new(FakeDiskCounter {
            name: process_name.to_string(),
            world: Arc::clone(&self.world),
        }))
    }
}

struct FakeConnections {
    world: SharedWorld,
}

impl ConnectionSource for FakeConnections {
    fn tcp_connections_by_pid(&mut self) -> Result<HashMap<u32, usize>> {
        Ok(self.world.lock().connections.clone())
    }
}

struct FakeGpu {
    world: SharedWorld,
    snapshot: Vec<SensorReading>,
}

impl SensorHardware for FakeGpu {
    fn kind(&self) -> HardwareKind {
        HardwareKind::GpuNvidia
    }

    fn name(&self) -> &str {
        "Fake GPU"
    }

    fn update(&mut self) -> Result<()> {
        let [load, temp, clock, memory] = self
            .world
            .lock()
            .gpu
            .ok_or_else(|| MonitorError::metric_collection("GPU vanished"))?;
        self.snapshot = vec![
            SensorReading::new(SensorKind::Load, GPU_CORE_SENSOR, Some(load)),
            SensorReading::new(SensorKind::Temperature, GPU_CORE_SENSOR, Some(temp)),
            SensorReading::new(SensorKind::Clock, GPU_CORE_SENSOR, Some(clock)),
            SensorReading::new(SensorKind::SmallData, GPU_MEMORY_USED_SENSOR, Some(memory)),
        ];
        Ok(())
    }

    fn sensors(&self) -> Vec<SensorReading> {
        self.snapshot.clone()
    }
}

struct FakeSensors {
    world: SharedWorld,
}

impl SensorBackend for FakeSensors {
    fn open(&mut self) -> Result<Vec<Box<dyn SensorHardware>>> {
        if self.world.lock().gpu.is_none() {
            return Err(MonitorError::gpu_not_available("no GPU in this machine"));
        }
        Ok(vec![Box::new(FakeGpu {
            world: Arc::clone(&self.world),
            snapshot: Vec::new(),
        })])
    }
}

struct FakeSystemInfo {
    world: SharedWorld,
}

impl SystemInfoSource for FakeSystemInfo {
    fn gather(&mut self) -> Result<StaticSystemInfo> {
        Ok(self.world.lock().static_info.clone())
    }
}

pub fn fake_collaborators(world: &SharedWorld, probe: &Arc<Probe>) -> Collaborators {
    Collaborators {
        processes: Box::new(FakeProcesses {
            world: Arc::clone(world),
            probe: Arc::clone(probe),
        }),
        disk_io: Box::new(FakeDisk {
            world: Arc::clone(world),
        }),
        connections: Box::new(FakeConnections {
            world: Arc::clone(world),
        }),
        sensors: Box::new(FakeSensors {
            world: Arc::clone(world),
        }),
        system_info: Box::new(FakeSystemInfo {
            world: Arc::clone(world),
        }),
    }
}

/// World with two `app` processes of 10 and 20 MiB plus one unrelated one
pub fn two_app_world() -> SharedWorld {
    let mut world = World::default();
    world.processes = vec![
        FakeProcess::new(100, "app", 10),
        FakeProcess::new(101, "app", 20),
        FakeProcess::new(200, "other", 500),
    ];
    Arc::new(Mutex::new(world))
}

/// Poll `condition` every few ms until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
