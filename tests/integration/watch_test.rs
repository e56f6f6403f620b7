use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use pgmon::commands::watch::{run, WatchOptions};
use pgmon::core::group_monitor::{MetricToggles, ProcessGroupMonitor, CSV_HEADER};
use tempfile::TempDir;

use super::support::{fake_collaborators, two_app_world, Probe};

fn options(json_path: Option<PathBuf>, count: usize) -> WatchOptions {
    WatchOptions {
        process_name: "app".to_string(),
        interval_ms: 10,
        toggles: MetricToggles::default(),
        csv_path: None,
        json_path,
        count: Some(count),
    }
}

#[test]
fn test_watch_stops_after_count_and_logs_each_sample() {
    let world = two_app_world();
    let probe = Arc::new(Probe::default());
    let monitor = ProcessGroupMonitor::new(fake_collaborators(&world, &probe));

    let dir = TempDir::new().unwrap();
    let json = dir.path().join("log.json");
    let cancel = AtomicBool::new(false);

    let collected = run(&monitor, &options(Some(json.clone()), 4), &cancel).unwrap();

    assert!(!monitor.is_running());
    assert!(collected.len() >= 4);
    let text = fs::read_to_string(&json).unwrap();
    assert_eq!(text.lines().count(), collected.len());
    assert!(text.lines().all(|line| line.ends_with("},")));

    let csv = dir.path().join("out.csv");
    pgmon::core::group_monitor::export::export_csv(&csv, collected.iter().map(|s| s.as_ref()))
        .unwrap();
    let csv_text = fs::read_to_string(&csv).unwrap();
    assert!(csv_text.starts_with(CSV_HEADER));
}

#[test]
fn test_watch_honours_cancel_flag() {
    let world = two_app_world();
    let probe = Arc::new(Probe::default());
    let monitor = ProcessGroupMonitor::new(fake_collaborators(&world, &probe));

    let cancel = AtomicBool::new(true);
    let collected = run(&monitor, &options(None, 1_000), &cancel).unwrap();

    assert!(!monitor.is_running());
    assert!(collected.len() < 1_000);
}

#[test]
fn test_watch_rejects_empty_name() {
    let world = two_app_world();
    let probe = Arc::new(Probe::default());
    let monitor = ProcessGroupMonitor::new(fake_collaborators(&world, &probe));

    let mut opts = options(None, 1);
    opts.process_name = String::new();
    let cancel = AtomicBool::new(false);

    assert!(run(&monitor, &opts, &cancel).is_err());
    assert_eq!(monitor.sample_buffer().subscriber_count(), 0);
}
