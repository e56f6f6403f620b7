use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};

use super::collector::{Collaborators, GroupCollector};
use super::history::{ChartSeriesBuffer, ChartWindow, SampleBuffer, SubscriptionId};
use super::metrics::{MetricToggles, Sample, StaticSystemInfo};
use super::scheduler::{in_tick, SamplingScheduler, SchedulerStats};
use crate::error::{MonitorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Running,
}

/// Parameters of the live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub process_name: String,
    pub toggles: MetricToggles,
    pub interval_ms: u64,
    pub state: SessionState,
}

struct ActiveSession {
    process_name: String,
    toggles: MetricToggles,
    interval_ms: u64,
}

/// Collector plus the parameters a tick reads. Ticks and control operations
/// both go through this lock, so a tick never sees a half-applied change.
struct SessionCore {
    collector: GroupCollector,
    session: Option<ActiveSession>,
}

/// Samples one process group at a fixed interval.
///
/// Control operations may be called from any thread, including from a
/// subscriber callback. Subscriber callbacks run on the scheduler's worker
/// thread.
pub struct ProcessGroupMonitor {
    core: Arc<Mutex<SessionCore>>,
    // Serializes start and stop. Never held by a tick.
    control: Mutex<()>,
    // Only locked briefly; stop takes the scheduler out before waiting on it.
    scheduler: Mutex<Option<SamplingScheduler>>,
    running: AtomicBool,
    samples: Arc<SampleBuffer>,
    charts: Arc<ChartSeriesBuffer>,
    // Held for writing while a sample lands in both buffers
    publish: Arc<RwLock<()>>,
}

impl ProcessGroupMonitor {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            core: Arc::new(Mutex::new(SessionCore {
                collector: GroupCollector::new(collaborators),
                session: None,
            })),
            control: Mutex::new(()),
            scheduler: Mutex::new(None),
            running: AtomicBool::new(false),
            samples: Arc::new(SampleBuffer::new()),
            charts: Arc::new(ChartSeriesBuffer::new()),
            publish: Arc::new(RwLock::new(())),
        }
    }

    /// Monitor backed by the host's process table and sensors
    pub fn with_platform() -> Self {
        Self::new(crate::platform::platform_collaborators())
    }

    /// Begin sampling every process named `process_name`.
    ///
    /// Clears the CPU baseline, the GPU last-known values and both buffers.
    pub fn start(
        &self,
        process_name: &str,
        toggles: MetricToggles,
        interval_ms: u64,
    ) -> Result<()> {
        let process_name = process_name.trim();
        if process_name.is_empty() {
            return Err(MonitorError::EmptyProcessName);
        }
        if interval_ms == 0 {
            return Err(MonitorError::InvalidInterval(interval_ms));
        }

        // A stop in progress on another thread means a session is still live
        let Some(_control) = self.lock_control() else {
            return Err(MonitorError::AlreadyRunning(self.current_process_name()));
        };
        if self.scheduler.lock().is_some() {
            return Err(MonitorError::AlreadyRunning(self.current_process_name()));
        }

        {
            let mut core = self.core.lock();
            core.collector.begin_session(toggles);
            core.session = Some(ActiveSession {
                process_name: process_name.to_string(),
                toggles,
                interval_ms,
            });
        }
        {
            let _publish = self.publish.write();
            self.samples.clear();
            self.charts.clear();
        }

        let core = Arc::clone(&self.core);
        let samples = Arc::clone(&self.samples);
        let charts = Arc::clone(&self.charts);
        let publish = Arc::clone(&self.publish);
        let started = SamplingScheduler::start(Duration::from_millis(interval_ms), move || {
            run_tick(&core, &samples, &charts, &publish)
        });

        match started {
            Ok(s) => {
                *self.scheduler.lock() = Some(s);
                self.running.store(true, Ordering::Release);
                log::info!(
                    "Monitoring '{}' every {} ms ({:?})",
                    process_name,
                    interval_ms,
                    toggles
                );
                Ok(())
            }
            Err(e) => {
                self.core.lock().session = None;
                Err(e)
            }
        }
    }

    /// Stop sampling. Once this returns no further tick runs. Idempotent.
    ///
    /// Waits for an in-flight tick, so its subscribers may still query the
    /// monitor meanwhile; they see it as no longer running.
    pub fn stop(&self) {
        // Inside a tick, a stop already running elsewhere will finish the job
        let Some(_control) = self.lock_control() else {
            return;
        };
        let Some(mut running) = self.scheduler.lock().take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        running.stop();
        drop(running);

        if let Some(session) = self.core.lock().session.take() {
            log::info!("Stopped monitoring '{}'", session.process_name);
        }
    }

    /// Change the sampling period. Takes effect on the next firing and keeps
    /// the CPU baseline.
    pub fn set_interval(&self, interval_ms: u64) -> Result<()> {
        if interval_ms == 0 {
            return Err(MonitorError::InvalidInterval(interval_ms));
        }

        let scheduler = self.scheduler.lock();
        let running = scheduler.as_ref().ok_or(MonitorError::NotRunning)?;
        running.set_interval(Duration::from_millis(interval_ms))?;

        if let Some(session) = self.core.lock().session.as_mut() {
            session.interval_ms = interval_ms;
        }
        Ok(())
    }

    /// Replace the toggle set. Applied at the next tick boundary.
    pub fn set_toggles(&self, toggles: MetricToggles) -> Result<()> {
        let mut core = self.core.lock();
        let session = core.session.as_mut().ok_or(MonitorError::NotRunning)?;
        if session.toggles != toggles {
            log::debug!("Toggles changed to {:?}", toggles);
            session.toggles = toggles;
        }
        Ok(())
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Sample) + Send + Sync + 'static,
    {
        self.samples.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.samples.unsubscribe(id)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn session(&self) -> Option<SessionInfo> {
        let running = self.is_running();
        let core = self.core.lock();
        core.session.as_ref().map(|s| SessionInfo {
            process_name: s.process_name.clone(),
            toggles: s.toggles,
            interval_ms: s.interval_ms,
            state: if running {
                SessionState::Running
            } else {
                SessionState::Stopped
            },
        })
    }

    /// Facts captured at the last `start`
    pub fn static_info(&self) -> StaticSystemInfo {
        self.core.lock().collector.static_info().clone()
    }

    pub fn scheduler_stats(&self) -> Option<SchedulerStats> {
        self.scheduler.lock().as_ref().map(|s| s.stats())
    }

    /// Sample history, oldest first
    pub fn samples(&self) -> Vec<Arc<Sample>> {
        self.samples.snapshot()
    }

    pub fn latest_sample(&self) -> Option<Arc<Sample>> {
        self.samples.latest()
    }

    pub fn chart_series(&self) -> ChartWindow {
        self.charts.snapshot()
    }

    /// Sample history and chart window taken together. The chart window
    /// always ends with the same sample as the history.
    pub fn history(&self) -> (Vec<Arc<Sample>>, ChartWindow) {
        let _publish = self.publish.read();
        (self.samples.snapshot(), self.charts.snapshot())
    }

    pub fn sample_buffer(&self) -> Arc<SampleBuffer> {
        Arc::clone(&self.samples)
    }

    pub fn chart_buffer(&self) -> Arc<ChartSeriesBuffer> {
        Arc::clone(&self.charts)
    }

    /// A tick that waited here could deadlock against a stop waiting for that
    /// tick, so inside a tick the lock is only tried.
    fn lock_control(&self) -> Option<MutexGuard<'_, ()>> {
        if in_tick() {
            self.control.try_lock()
        } else {
            Some(self.control.lock())
        }
    }

    fn current_process_name(&self) -> String {
        self.core
            .lock()
            .session
            .as_ref()
            .map(|s| s.process_name.clone())
            .unwrap_or_default()
    }
}

impl Drop for ProcessGroupMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_tick(
    core: &Mutex<SessionCore>,
    samples: &SampleBuffer,
    charts: &ChartSeriesBuffer,
    publish: &RwLock<()>,
) -> Result<()> {
    let sample = {
        let mut core = core.lock();
        let SessionCore { collector, session } = &mut *core;
        let Some(session) = session.as_ref() else {
            return Ok(());
        };
        collector.sample(&session.process_name, session.toggles)
    };

    if let Some(sample) = sample {
        let sample = Arc::new(sample);
        {
            let _publish = publish.write();
            charts.push_sample(&sample);
            samples.record(Arc::clone(&sample));
        }
        samples.notify(&sample);
    }
    Ok(())
}
