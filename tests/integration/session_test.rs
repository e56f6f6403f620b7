use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use pgmon::core::group_monitor::{
    ChartMetric, MetricToggles, ProcessGroupMonitor, Sample, SessionState,
    CHART_WINDOW_CAPACITY, SAMPLE_HISTORY_CAPACITY,
};
use pgmon::MonitorError;

use super::support::{fake_collaborators, two_app_world, wait_until, FakeProcess, Probe};

const WAIT: Duration = Duration::from_secs(5);

fn monitor_for(world: &super::support::SharedWorld) -> (ProcessGroupMonitor, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    (
        ProcessGroupMonitor::new(fake_collaborators(world, &probe)),
        probe,
    )
}

#[test]
fn test_first_sample_has_zero_cpu_and_summed_memory() {
    let world = two_app_world();
    world.lock().cpu_step_ms = 50;
    let (monitor, _) = monitor_for(&world);

    monitor.start("app", MetricToggles::default(), 20).unwrap();
    assert!(wait_until(WAIT, || monitor.samples().len() >= 3));
    monitor.stop();

    let samples = monitor.samples();
    let first = &samples[0];
    assert_eq!(first.process_name, "app");
    assert_eq!(first.cpu_usage, 0.0);
    assert_eq!(first.memory_usage, 30.0);
    assert_eq!(first.private_memory_usage, 15.0);
    assert_eq!(first.thread_count, 8);
    assert_eq!(first.group_size, 2);
    assert_eq!(first.process_count, 180);

    assert!(samples[1..].iter().any(|s| s.cpu_usage > 0.0));
}

#[test]
fn test_network_and_disk_follow_the_group() {
    let world = two_app_world();
    {
        let mut w = world.lock();
        w.connections.insert(100, 2);
        w.connections.insert(101, 1);
        w.connections.insert(200, 9);
        w.disk_bytes_per_sec = 3.0 * 1_048_576.0;
    }
    let (monitor, _) = monitor_for(&world);

    monitor.start("app", MetricToggles::default(), 20).unwrap();
    assert!(wait_until(WAIT, || monitor.latest_sample().is_some()));
    monitor.stop();

    let sample = monitor.latest_sample().unwrap();
    assert_eq!(sample.network_usage, 30.0);
    assert_eq!(sample.disk_io, 3.0);
}

#[test]
fn test_disabled_metrics_report_zero() {
    let world = two_app_world();
    {
        let mut w = world.lock();
        w.cpu_step_ms = 50;
        w.connections.insert(100, 4);
        w.disk_bytes_per_sec = 1_048_576.0;
        w.gpu = Some([40.0, 65.0, 1500.0, 900.0]);
    }
    let (monitor, _) = monitor_for(&world);

    monitor.start("app", MetricToggles::none(), 20).unwrap();
    assert!(wait_until(WAIT, || monitor.samples().len() >= 2));
    monitor.stop();

    for sample in monitor.samples() {
        assert_eq!(sample.cpu_usage, 0.0);
        assert_eq!(sample.memory_usage, 0.0);
        assert_eq!(sample.thread_count, 0);
        assert_eq!(sample.disk_io, 0.0);
        assert_eq!(sample.network_usage, 0.0);
        assert_eq!(sample.gpu_usage_percent, 0.0);
        assert_eq!(sample.logical_processor_count, 0);
        assert_eq!(sample.virtualization_status, "");
        // Bookkeeping fields are always present
        assert_eq!(sample.process_count, 180);
        assert_eq!(sample.group_size, 2);
    }
}

#[test]
fn test_advanced_fields_come_from_static_info() {
    let world = two_app_world();
    let (monitor, _) = monitor_for(&world);

    let toggles = MetricToggles {
        advanced: true,
        ..MetricToggles::default()
    };
    monitor.start("app", toggles, 20).unwrap();
    assert!(wait_until(WAIT, || monitor.latest_sample().is_some()));
    monitor.stop();

    let sample = monitor.latest_sample().unwrap();
    assert_eq!(sample.logical_processor_count, 8);
    assert_eq!(sample.physical_core_count, 4);
    assert_eq!(sample.clock_speed_mhz, 3200);
    assert_eq!(sample.l3_cache_kb, 16384);
    assert_eq!(sample.virtualization_status, "Enabled");
    assert_eq!(monitor.static_info().l2_cache_kb, 512);
}

#[test]
fn test_reenabling_cpu_rebaselines() {
    let world = two_app_world();
    world.lock().cpu_step_ms = 50;
    let (monitor, _) = monitor_for(&world);

    let cpu_off = MetricToggles {
        cpu: false,
        ..MetricToggles::default()
    };
    monitor.start("app", cpu_off, 20).unwrap();
    assert!(wait_until(WAIT, || monitor.samples().len() >= 2));

    let seen: Arc<Mutex<Vec<Sample>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    monitor.subscribe(move |sample| sink.lock().push(sample.clone()));

    monitor.set_toggles(MetricToggles::default()).unwrap();
    assert!(wait_until(WAIT, || {
        seen.lock().iter().filter(|s| s.memory_usage > 0.0).count() >= 4
    }));
    monitor.stop();

    let seen = seen.lock();
    // Samples taken before the toggle landed may still have CPU off; the
    // first one with CPU on only records the baseline.
    let mut cpu_on = seen.iter().skip_while(|s| s.cpu_usage == 0.0).peekable();
    assert!(cpu_on.peek().is_some());
    assert!(cpu_on.all(|s| s.cpu_usage > 0.0));
    assert_eq!(monitor.session(), None);
}

#[test]
fn test_exited_process_is_left_out() {
    let world = two_app_world();
    world.lock().processes.push(FakeProcess::new(102, "app", 5));
    let (monitor, _) = monitor_for(&world);

    monitor.start("app", MetricToggles::default(), 20).unwrap();
    assert!(wait_until(WAIT, || monitor
        .latest_sample()
        .is_some_and(|s| s.group_size == 3)));

    if let Some(p) = world.lock().processes.iter_mut().find(|p| p.pid == 102) {
        p.readable = false;
    }
    assert!(wait_until(WAIT, || monitor
        .latest_sample()
        .is_some_and(|s| s.group_size == 2)));
    monitor.stop();

    let last = monitor.latest_sample().unwrap();
    assert_eq!(last.memory_usage, 30.0);
}

#[test]
fn test_no_matching_process_produces_no_sample() {
    let world = two_app_world();
    let (monitor, probe) = monitor_for(&world);

    monitor
        .start("not-running", MetricToggles::default(), 10)
        .unwrap();
    assert!(wait_until(WAIT, || probe.enumerations.load(Ordering::SeqCst) >= 5));

    assert!(monitor.is_running());
    assert!(monitor.samples().is_empty());
    assert!(monitor.chart_series().is_empty());
    monitor.stop();
}

#[test]
fn test_slow_collection_never_overlaps() {
    let world = two_app_world();
    world.lock().enumerate_delay = Duration::from_millis(60);
    let (monitor, probe) = monitor_for(&world);

    monitor.start("app", MetricToggles::default(), 10).unwrap();
    std::thread::sleep(Duration::from_millis(500));

    let stats = monitor.scheduler_stats().unwrap();
    monitor.stop();

    assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
    assert!(stats.skipped > 0, "{:?}", stats);
    assert!(monitor.samples().len() < stats.fired as usize);
}

#[test]
fn test_history_is_bounded() {
    let world = two_app_world();
    let (monitor, _) = monitor_for(&world);

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    monitor.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    monitor.start("app", MetricToggles::default(), 1).unwrap();
    assert!(wait_until(Duration::from_secs(20), || delivered
        .load(Ordering::SeqCst)
        > SAMPLE_HISTORY_CAPACITY + 10));
    monitor.stop();

    assert_eq!(monitor.samples().len(), SAMPLE_HISTORY_CAPACITY);
    let charts = monitor.chart_series();
    assert_eq!(charts.len(), CHART_WINDOW_CAPACITY);
    for metric in ChartMetric::ALL {
        assert_eq!(charts.series(metric).len(), CHART_WINDOW_CAPACITY);
    }
}

#[test]
fn test_stop_quiesces() {
    let world = two_app_world();
    let (monitor, _) = monitor_for(&world);

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    monitor.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    monitor.start("app", MetricToggles::default(), 10).unwrap();
    assert!(wait_until(WAIT, || delivered.load(Ordering::SeqCst) >= 3));
    monitor.stop();

    let after_stop = delivered.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(delivered.load(Ordering::SeqCst), after_stop);
    assert!(!monitor.is_running());
    assert!(monitor.session().is_none());
    assert!(monitor.scheduler_stats().is_none());

    // History stays readable after the session ends
    assert_eq!(monitor.samples().len(), after_stop);
    monitor.stop();
}

#[test]
fn test_restart_clears_history() {
    let world = two_app_world();
    let (monitor, _) = monitor_for(&world);

    monitor.start("app", MetricToggles::default(), 10).unwrap();
    assert!(wait_until(WAIT, || monitor.samples().len() >= 3));
    monitor.stop();

    monitor.start("other", MetricToggles::default(), 1000).unwrap();
    assert!(monitor.samples().is_empty());
    assert!(monitor.chart_series().is_empty());
    monitor.stop();
}

#[test]
fn test_control_misuse_errors() {
    let world = two_app_world();
    let (monitor, _) = monitor_for(&world);

    assert!(matches!(
        monitor.start("   ", MetricToggles::default(), 1000),
        Err(MonitorError::EmptyProcessName)
    ));
    assert!(matches!(
        monitor.start("app", MetricToggles::default(), 0),
        Err(MonitorError::InvalidInterval(0))
    ));
    assert!(matches!(
        monitor.set_interval(500),
        Err(MonitorError::NotRunning)
    ));
    assert!(matches!(
        monitor.set_toggles(MetricToggles::all()),
        Err(MonitorError::NotRunning)
    ));

    monitor.start("app", MetricToggles::default(), 1000).unwrap();
    match monitor.start("other", MetricToggles::default(), 1000) {
        Err(MonitorError::AlreadyRunning(name)) => assert_eq!(name, "app"),
        other => panic!("expected AlreadyRunning, got {:?}", other.err()),
    }
    assert!(matches!(
        monitor.set_interval(0),
        Err(MonitorError::InvalidInterval(0))
    ));

    monitor.set_interval(500).unwrap();
    let session = monitor.session().unwrap();
    assert_eq!(session.process_name, "app");
    assert_eq!(session.interval_ms, 500);
    assert_eq!(session.state, SessionState::Running);

    monitor.stop();
    monitor.stop();
}

#[test]
fn test_gpu_degraded_mode() {
    let world = two_app_world();
    let (monitor, _) = monitor_for(&world);

    let toggles = MetricToggles {
        gpu: true,
        ..MetricToggles::default()
    };
    monitor.start("app", toggles, 20).unwrap();
    assert!(wait_until(WAIT, || monitor.samples().len() >= 2));
    monitor.stop();

    for sample in monitor.samples() {
        assert_eq!(sample.gpu_usage_percent, 0.0);
        assert_eq!(sample.gpu_memory_mb, 0.0);
        assert_eq!(sample.memory_usage, 30.0);
    }
}

#[test]
fn test_gpu_readings_and_last_known_values() {
    let world = two_app_world();
    world.lock().gpu = Some([40.0, 65.0, 1500.0, 900.0]);
    let (monitor, _) = monitor_for(&world);

    let toggles = MetricToggles {
        gpu: true,
        ..MetricToggles::default()
    };
    monitor.start("app", toggles, 20).unwrap();
    assert!(wait_until(WAIT, || monitor.latest_sample().is_some()));

    let sample = monitor.latest_sample().unwrap();
    assert_eq!(sample.gpu_usage_percent, 40.0);
    assert_eq!(sample.gpu_temp_c, 65.0);
    assert_eq!(sample.gpu_clock_mhz, 1500.0);
    assert_eq!(sample.gpu_memory_mb, 900.0);

    // Refresh failures keep the previous readings
    world.lock().gpu = None;
    let before = monitor.samples().len();
    assert!(wait_until(WAIT, || monitor.samples().len() >= before + 2));
    monitor.stop();
    assert_eq!(monitor.latest_sample().unwrap().gpu_usage_percent, 40.0);

    let gpu_series = monitor.chart_buffer().series(ChartMetric::Gpu);
    assert!(gpu_series.iter().all(|v| *v == 40.0));
}

#[test]
fn test_subscriber_can_stop_the_monitor() {
    let world = two_app_world();
    let probe = Arc::new(Probe::default());
    let monitor = Arc::new(ProcessGroupMonitor::new(fake_collaborators(&world, &probe)));

    let weak: Weak<ProcessGroupMonitor> = Arc::downgrade(&monitor);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    monitor.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(monitor) = weak.upgrade() {
            monitor.stop();
        }
    });

    monitor.start("app", MetricToggles::default(), 10).unwrap();
    assert!(wait_until(WAIT, || !monitor.is_running()));

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let world = two_app_world();
    let (monitor, _) = monitor_for(&world);

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let id = monitor.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    monitor.start("app", MetricToggles::default(), 10).unwrap();
    assert!(wait_until(WAIT, || delivered.load(Ordering::SeqCst) >= 2));
    assert!(monitor.unsubscribe(id));
    let after = delivered.load(Ordering::SeqCst);

    let samples = monitor.samples().len();
    assert!(wait_until(WAIT, || monitor.samples().len() >= samples + 3));
    monitor.stop();

    assert_eq!(delivered.load(Ordering::SeqCst), after);
    assert!(!monitor.unsubscribe(id));
}

#[test]
fn test_stop_waits_out_a_subscriber_that_queries_the_monitor() {
    let world = two_app_world();
    let (monitor, _) = monitor_for(&world);
    let monitor = Arc::new(monitor);

    let weak = Arc::downgrade(&monitor);
    let deliveries = Arc::new(AtomicUsize::new(0));
    let seen_running: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::clone(&deliveries);
    let seen = Arc::clone(&seen_running);
    monitor.subscribe(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(200));
            if let Some(monitor) = weak.upgrade() {
                seen.lock().push(monitor.is_running());
                let _ = monitor.session();
                let _ = monitor.scheduler_stats();
                let _ = monitor.set_interval(50);
            }
        }
    });

    monitor.start("app", MetricToggles::default(), 10).unwrap();
    assert!(wait_until(WAIT, || deliveries.load(Ordering::SeqCst) >= 1));

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let stopper = Arc::clone(&monitor);
    std::thread::spawn(move || {
        stopper.stop();
        let _ = done_tx.send(());
    });

    assert!(done_rx.recv_timeout(Duration::from_secs(3)).is_ok());
    assert!(!monitor.is_running());
    assert_eq!(monitor.session(), None);
    assert_eq!(seen_running.lock().len(), 1);
}

#[test]
fn test_history_and_charts_advance_together() {
    let world = two_app_world();
    let (monitor, _) = monitor_for(&world);

    monitor.start("app", MetricToggles::default(), 1).unwrap();
    let mut checks = 0;
    let deadline = std::time::Instant::now() + Duration::from_millis(300);
    while std::time::Instant::now() < deadline {
        let (samples, charts) = monitor.history();
        assert_eq!(charts.len(), samples.len().min(CHART_WINDOW_CAPACITY));
        if let (Some(last), Some(point)) = (samples.last(), charts.memory.latest()) {
            assert_eq!(*point, last.memory_usage as f64);
        }
        checks += 1;
    }
    monitor.stop();
    assert!(checks > 0);
    assert!(!monitor.samples().is_empty());
}
