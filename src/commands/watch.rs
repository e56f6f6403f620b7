//! `pgmon watch` command handler.
//!
//! Samples a process group until Ctrl+C or until the requested number of
//! samples arrived, printing one line per sample.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use parking_lot::Mutex;

use crate::core::group_monitor::export::{export_csv, JsonLogWriter};
use crate::core::group_monitor::{MetricToggles, ProcessGroupMonitor, Sample};
use crate::core::MonitorConfig;
use crate::ui::{self, format_sample_line, format_static_info};

/// Clap definition of the `watch` subcommand
pub fn command() -> Command {
    Command::new("watch")
        .about("Monitor every process sharing a name")
        .arg(
            Arg::new("name")
                .help("Process name (with or without .exe)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("MS")
                .help("Sampling interval in milliseconds (presets: 500, 1000, 2000)")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("no-cpu")
                .long("no-cpu")
                .help("Do not collect CPU usage")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-memory")
                .long("no-memory")
                .help("Do not collect memory and thread counts")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-disk")
                .long("no-disk")
                .help("Do not collect disk IO")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-network")
                .long("no-network")
                .help("Do not collect the network activity score")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("gpu")
                .long("gpu")
                .help("Collect GPU load, temperature, clock and memory")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("advanced")
                .long("advanced")
                .help("Attach static CPU facts (cores, clock, caches) to every sample")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("csv")
                .long("csv")
                .value_name("PATH")
                .help("Write every collected sample to this CSV file on exit")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .value_name("PATH")
                .help("Append each sample to this JSON log as it arrives")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("count")
                .short('n')
                .long("count")
                .value_name("N")
                .help("Stop after N samples")
                .value_parser(clap::value_parser!(usize)),
        )
}

/// Effective settings of one `watch` run
#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    pub process_name: String,
    pub interval_ms: u64,
    pub toggles: MetricToggles,
    pub csv_path: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
    pub count: Option<usize>,
}

impl WatchOptions {
    /// Saved configuration overridden by command-line flags
    pub fn resolve(matches: &ArgMatches, config: &MonitorConfig) -> Result<Self> {
        let process_name = matches
            .get_one::<String>("name")
            .context("Process name is required")?
            .clone();

        let interval_ms = matches
            .get_one::<u64>("interval")
            .copied()
            .unwrap_or(config.interval_ms);

        let mut toggles = config.toggles;
        if matches.get_flag("no-cpu") {
            toggles.cpu = false;
        }
        if matches.get_flag("no-memory") {
            toggles.memory = false;
        }
        if matches.get_flag("no-disk") {
            toggles.disk = false;
        }
        if matches.get_flag("no-network") {
            toggles.network = false;
        }
        if matches.get_flag("gpu") {
            toggles.gpu = true;
        }
        if matches.get_flag("advanced") {
            toggles.advanced = true;
        }

        let csv_path = matches
            .get_one::<PathBuf>("csv")
            .cloned()
            .or_else(|| config.csv_path.as_ref().map(PathBuf::from));
        let json_path = matches
            .get_one::<PathBuf>("json")
            .cloned()
            .or_else(|| config.json_log_path.as_ref().map(PathBuf::from));

        Ok(Self {
            process_name,
            interval_ms,
            toggles,
            csv_path,
            json_path,
            count: matches.get_one::<usize>("count").copied(),
        })
    }
}

/// Execute the watch command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let config = MonitorConfig::load().unwrap_or_else(|e| {
        log::warn!("Using default configuration: {:#}", e);
        MonitorConfig::default()
    });
    let options = WatchOptions::resolve(matches, &config)?;

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let cancel_flag_clone = Arc::clone(&cancel_flag);

    // Setup Ctrl+C handler
    ctrlc::set_handler(move || {
        println!();
        println!("{}", "Stopping monitor...".yellow().bold());
        cancel_flag_clone.store(true, Ordering::Relaxed);
    })
    .map_err(|e| anyhow::anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    let monitor = ProcessGroupMonitor::with_platform();
    let collected = run(&monitor, &options, &cancel_flag)?;

    finish(&options, &collected)
}

/// Drive one session until cancelled or `options.count` samples arrived.
/// Returns every sample seen, oldest first.
pub fn run(
    monitor: &ProcessGroupMonitor,
    options: &WatchOptions,
    cancel: &AtomicBool,
) -> Result<Vec<Arc<Sample>>> {
    let json_log = match &options.json_path {
        Some(path) => Some(
            JsonLogWriter::append_to(path)
                .with_context(|| format!("Failed to open JSON log: {:?}", path))?,
        ),
        None => None,
    };
    let json_log = Arc::new(Mutex::new(json_log));
    let collected: Arc<Mutex<Vec<Arc<Sample>>>> = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel::<()>();

    let subscription = {
        let json_log = Arc::clone(&json_log);
        let collected = Arc::clone(&collected);
        let toggles = options.toggles;
        monitor.subscribe(move |sample| {
            println!("{}", format_sample_line(sample, &toggles));

            if let Some(writer) = json_log.lock().as_mut() {
                if let Err(e) = writer.append(sample) {
                    log::warn!("Failed to append to JSON log: {}", e);
                }
            }
            collected.lock().push(Arc::new(sample.clone()));
            let _ = tx.send(());
        })
    };

    if let Err(e) = monitor.start(&options.process_name, options.toggles, options.interval_ms) {
        monitor.unsubscribe(subscription);
        return Err(e)
            .with_context(|| format!("Failed to start monitoring '{}'", options.process_name));
    }

    ui::info(&format!(
        "Monitoring '{}' every {} ms. Press Ctrl+C to stop.",
        options.process_name, options.interval_ms
    ));
    if options.toggles.advanced {
        ui::dimmed(&format_static_info(&monitor.static_info()));
    }

    let mut received = 0usize;
    while !cancel.load(Ordering::Relaxed) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(()) => {
                received += 1;
                if options.count.is_some_and(|n| received >= n) {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    monitor.stop();
    monitor.unsubscribe(subscription);

    let samples = std::mem::take(&mut *collected.lock());
    Ok(samples)
}

fn finish(options: &WatchOptions, samples: &[Arc<Sample>]) -> Result<()> {
    println!();
    if samples.is_empty() {
        ui::warn(&format!(
            "No samples collected. Is '{}' running?",
            options.process_name
        ));
    } else {
        let peak = samples
            .iter()
            .map(|s| s.cpu_usage)
            .fold(0.0f32, f32::max);
        println!(
            "{} {}  {} {}",
            "Samples:".white(),
            samples.len().to_string().cyan().bold(),
            "Peak CPU:".white(),
            ui::colorize_cpu(peak)
        );
    }

    if let Some(path) = &options.csv_path {
        let rows = export_csv(path, samples.iter().map(|s| s.as_ref()))
            .with_context(|| format!("Failed to write CSV: {:?}", path))?;
        ui::success(&format!("Exported {} samples to {}", rows, path.display()));
    }
    if let Some(path) = &options.json_path {
        ui::dimmed(&format!("JSON log: {}", path.display()));
    }

    Ok(())
}
