use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use colored::Colorize;

use crate::core::config::INTERVAL_PRESETS_MS;
use crate::core::MonitorConfig;

/// Settings addressable from `pgmon config set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Interval,
    Cpu,
    Memory,
    Disk,
    Network,
    Gpu,
    Advanced,
    Csv,
    Json,
}

impl ConfigKey {
    pub const NAMES: [&'static str; 9] = [
        "interval", "cpu", "memory", "disk", "network", "gpu", "advanced", "csv", "json",
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "interval" => Some(ConfigKey::Interval),
            "cpu" => Some(ConfigKey::Cpu),
            "memory" => Some(ConfigKey::Memory),
            "disk" => Some(ConfigKey::Disk),
            "network" => Some(ConfigKey::Network),
            "gpu" => Some(ConfigKey::Gpu),
            "advanced" => Some(ConfigKey::Advanced),
            "csv" => Some(ConfigKey::Csv),
            "json" => Some(ConfigKey::Json),
            _ => None,
        }
    }

    fn toggle<'a>(&self, config: &'a mut MonitorConfig) -> Option<&'a mut bool> {
        let toggles = &mut config.toggles;
        match self {
            ConfigKey::Cpu => Some(&mut toggles.cpu),
            ConfigKey::Memory => Some(&mut toggles.memory),
            ConfigKey::Disk => Some(&mut toggles.disk),
            ConfigKey::Network => Some(&mut toggles.network),
            ConfigKey::Gpu => Some(&mut toggles.gpu),
            ConfigKey::Advanced => Some(&mut toggles.advanced),
            ConfigKey::Interval | ConfigKey::Csv | ConfigKey::Json => None,
        }
    }
}

fn parse_switch(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => bail!("Expected on/off, got '{}'", value),
    }
}

/// Apply one `key value` pair. An empty value clears csv/json paths.
pub fn apply_setting(config: &mut MonitorConfig, key: ConfigKey, value: &str) -> Result<()> {
    match key {
        ConfigKey::Interval => {
            let interval_ms: u64 = value
                .parse()
                .with_context(|| format!("Invalid interval: '{}'", value))?;
            if interval_ms == 0 {
                bail!("Interval must be greater than zero");
            }
            config.set_interval(interval_ms);
        }
        ConfigKey::Csv => config.csv_path = non_empty(value),
        ConfigKey::Json => config.json_log_path = non_empty(value),
        _ => {
            let enabled = parse_switch(value)?;
            if let Some(slot) = key.toggle(config) {
                *slot = enabled;
            }
        }
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub fn command() -> Command {
    Command::new("config")
        .about("Show or change saved defaults (use 'pgmon config --help' for subcommands)")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("show").about("Print the saved configuration"))
        .subcommand(
            Command::new("set")
                .about("Change one saved setting")
                .arg(
                    Arg::new("key")
                        .help("interval, cpu, memory, disk, network, gpu, advanced, csv or json")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("value")
                        .help("Milliseconds, on/off, or a path (empty to clear)")
                        .required(true)
                        .index(2),
                ),
        )
        .subcommand(Command::new("reset").about("Restore the default configuration"))
}

pub fn execute(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", _)) => handle_show(),
        Some(("set", sub_matches)) => handle_set(sub_matches),
        Some(("reset", _)) => handle_reset(),
        _ => {
            println!("Use 'pgmon config --help' for more information.");
            Ok(())
        }
    }
}

fn handle_show() -> Result<()> {
    let config = MonitorConfig::load()?;
    let on_off = |enabled: bool| {
        if enabled {
            "on".green()
        } else {
            "off".dimmed()
        }
    };

    let preset_note = if config.is_preset_interval() {
        String::new()
    } else {
        format!(" (presets: {:?})", INTERVAL_PRESETS_MS)
    };
    println!(
        "{} {} ms{}",
        "interval:".white(),
        config.interval_ms.to_string().cyan().bold(),
        preset_note.dimmed()
    );
    let toggles = config.toggles;
    println!("{} {}", "cpu:".white(), on_off(toggles.cpu));
    println!("{} {}", "memory:".white(), on_off(toggles.memory));
    println!("{} {}", "disk:".white(), on_off(toggles.disk));
    println!("{} {}", "network:".white(), on_off(toggles.network));
    println!("{} {}", "gpu:".white(), on_off(toggles.gpu));
    println!("{} {}", "advanced:".white(), on_off(toggles.advanced));
    println!(
        "{} {}",
        "csv:".white(),
        config.csv_path.as_deref().unwrap_or("-").cyan()
    );
    println!(
        "{} {}",
        "json:".white(),
        config.json_log_path.as_deref().unwrap_or("-").cyan()
    );
    Ok(())
}

fn handle_set(matches: &ArgMatches) -> Result<()> {
    let key_name = matches
        .get_one::<String>("key")
        .context("Key argument is required")?;
    let value = matches
        .get_one::<String>("value")
        .context("Value argument is required")?;

    let Some(key) = ConfigKey::parse(key_name) else {
        bail!(
            "Unknown setting '{}'. Expected one of: {}",
            key_name,
            ConfigKey::NAMES.join(", ")
        );
    };

    let mut config = MonitorConfig::load()?;
    apply_setting(&mut config, key, value)?;
    config.save()?;

    println!("{} {} = {}", "✓".green(), key_name.to_ascii_lowercase(), value.cyan());
    Ok(())
}

fn handle_reset() -> Result<()> {
    MonitorConfig::default().save()?;
    println!("{}", "✓ Configuration reset to defaults".green());
    Ok(())
}
