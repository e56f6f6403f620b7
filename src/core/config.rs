use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::group_monitor::MetricToggles;

/// Sampling intervals offered by front-ends
pub const INTERVAL_PRESETS_MS: [u64; 3] = [500, 1000, 2000];

pub const DEFAULT_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub toggles: MetricToggles,
    /// CSV written when a session ends
    #[serde(default)]
    pub csv_path: Option<String>,
    /// JSON log appended to on every sample
    #[serde(default)]
    pub json_log_path: Option<String>,
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            toggles: MetricToggles::default(),
            csv_path: None,
            json_log_path: None,
        }
    }
}

impl MonitorConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(MonitorConfig::default());
        }

        let data = fs::read(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // An empty or outdated file falls back to defaults
        if data.is_empty() {
            return Ok(MonitorConfig::default());
        }
        let mut config: MonitorConfig = serde_json::from_slice(&data).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable config {:?}: {}", config_path, e);
            MonitorConfig::default()
        });
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data =
            serde_json::to_vec_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(config_path, data)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join("pgmon").join("config.json"))
    }

    /// Replace a zero interval with the default
    pub fn normalize(&mut self) {
        if self.interval_ms == 0 {
            self.interval_ms = DEFAULT_INTERVAL_MS;
        }
    }

    pub fn set_interval(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
    }

    pub fn is_preset_interval(&self) -> bool {
        INTERVAL_PRESETS_MS.contains(&self.interval_ms)
    }
}
