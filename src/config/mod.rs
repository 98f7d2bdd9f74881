// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Configuration module

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main agent configuration
///
/// Built once at startup and handed to each component by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Human readable device name
    pub device_name: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Which sensing capability to run
    pub mode: SensingMode,

    /// Backend configuration
    pub backend: BackendConfig,

    /// Audio capture and scoring configuration
    pub audio: AudioConfig,

    /// Digital sound sensor configuration
    pub sound_sensor: SoundSensorConfig,

    /// Periodic duty intervals
    pub schedule: ScheduleConfig,

    /// Database configuration
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: "MachinaEar-Pi".to_string(),
            data_dir: default_data_dir(),
            database: DatabaseConfig::default(),
            log_level: "info".to_string(),
            mode: SensingMode::Audio,
            backend: BackendConfig::default(),
            audio: AudioConfig::default(),
            sound_sensor: SoundSensorConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("machinaear"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Point the data directory somewhere else
    pub fn set_data_dir(&mut self, data_dir: PathBuf) {
        self.data_dir = data_dir;
    }

    /// Event database location: `[database].path` when set, else `data_dir/events.db`
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DATABASE_FILE))
    }

    /// Reject values the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.backend.api_base_url.trim().is_empty() {
            bail!("backend.api_base_url must not be empty");
        }
        if !self.backend.api_base_url.starts_with("http://")
            && !self.backend.api_base_url.starts_with("https://")
        {
            bail!("backend.api_base_url must be an http(s) URL: {}", self.backend.api_base_url);
        }
        if self.audio.anomaly_threshold < 0.0 || !self.audio.anomaly_threshold.is_finite() {
            bail!("audio.anomaly_threshold must be a finite non-negative number");
        }
        if self.audio.n_mels == 0 || self.audio.n_fft == 0 || self.audio.hop_length == 0 {
            bail!("audio.n_mels, audio.n_fft and audio.hop_length must be positive");
        }
        if self.audio.sample_rate == 0 || self.audio.chunk_duration_secs <= 0.0 {
            bail!("audio.sample_rate and audio.chunk_duration_secs must be positive");
        }
        if !(self.sound_sensor.window_secs > 0.0 && self.sound_sensor.window_secs.is_finite()) {
            bail!("sound_sensor.window_secs must be positive");
        }
        if self.sound_sensor.trigger_count == 0 || self.sound_sensor.full_scale_count == 0 {
            bail!("sound_sensor.trigger_count and sound_sensor.full_scale_count must be positive");
        }
        if self.schedule.pairing_poll_interval_secs == 0 {
            bail!("schedule.pairing_poll_interval_secs must be positive");
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|d| d.join(".machinaear"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Sensing capability selected at startup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensingMode {
    /// Microphone clip scored by a reconstruction model
    Audio,
    /// Digital sound sensor on a GPIO pin
    Gpio,
    /// Simulated sound sensor edges
    Simulated,
}

impl std::str::FromStr for SensingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "audio" => Ok(SensingMode::Audio),
            "gpio" => Ok(SensingMode::Gpio),
            "simulated" | "sim" | "demo" => Ok(SensingMode::Simulated),
            other => bail!("unknown sensing mode '{}'", other),
        }
    }
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the device API
    pub api_base_url: String,

    /// Timeout for each backend request in seconds
    pub request_timeout_secs: u64,

    /// Endpoint used for reachability checks
    pub probe_url: String,

    /// Timeout for the reachability check in seconds
    pub probe_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://iam.machinaear.me/iam".to_string(),
            request_timeout_secs: 10,
            probe_url: "https://www.google.com".to_string(),
            probe_timeout_secs: 5,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Audio configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Length of each recorded clip in seconds
    pub chunk_duration_secs: f64,

    /// Mel bands (also the side of the square feature patch)
    pub n_mels: usize,

    /// FFT size
    pub n_fft: usize,

    /// STFT hop length
    pub hop_length: usize,

    /// Reconstruction error above which a clip is anomalous
    pub anomaly_threshold: f64,

    /// Trained model checkpoint
    pub model_path: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            chunk_duration_secs: 1.0,
            n_mels: 128,
            n_fft: 1024,
            hop_length: 512,
            anomaly_threshold: 0.1,
            model_path: None,
        }
    }
}

impl AudioConfig {
    /// Number of samples in one clip
    pub fn chunk_samples(&self) -> usize {
        (self.chunk_duration_secs * self.sample_rate as f64).round() as usize
    }
}

/// Digital sound sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundSensorConfig {
    /// BCM pin wired to the sensor's digital output
    pub gpio_pin: u32,

    /// Trailing window over which edges are counted
    pub window_secs: f64,

    /// Edge count in the window that flags an anomaly
    pub trigger_count: usize,

    /// Edge count mapped to a transmitted score of 1.0
    pub full_scale_count: usize,

    /// Minimum spacing between two accepted edges
    pub debounce_ms: u64,

    /// GPIO value polling period
    pub poll_interval_ms: u64,

    /// Persist samples with zero edges in the window. Turning this off
    /// keeps the log to windows that heard something.
    pub persist_quiet_samples: bool,
}

impl Default for SoundSensorConfig {
    fn default() -> Self {
        Self {
            gpio_pin: 4,
            window_secs: 5.0,
            trigger_count: 5,
            full_scale_count: 10,
            debounce_ms: 200,
            poll_interval_ms: 5,
            persist_quiet_samples: true,
        }
    }
}

impl SoundSensorConfig {
    pub fn window(&self) -> Duration {
        Duration::try_from_secs_f64(self.window_secs).unwrap_or(Duration::ZERO)
    }
}

/// Periodic duty configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Backlog sync interval in seconds
    pub sync_interval_secs: u64,

    /// Liveness heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,

    /// Minimum spacing of real-time pushes in seconds (0 pushes every sample)
    pub status_update_interval_secs: u64,

    /// Pause between loop iterations in milliseconds
    pub loop_delay_ms: u64,

    /// Pairing poll interval in seconds
    pub pairing_poll_interval_secs: u64,

    /// Re-send the pending registration after this many unanswered polls (0 disables)
    pub reregister_every: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 30,
            heartbeat_interval_secs: 60,
            status_update_interval_secs: 0,
            loop_delay_ms: 500,
            pairing_poll_interval_secs: 5,
            reregister_every: 12,
        }
    }
}

impl ScheduleConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn status_update_interval(&self) -> Duration {
        Duration::from_secs(self.status_update_interval_secs)
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.loop_delay_ms)
    }

    pub fn pairing_poll_interval(&self) -> Duration {
        Duration::from_secs(self.pairing_poll_interval_secs)
    }
}

const DATABASE_FILE: &str = "events.db";

/// Database configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Explicit database path; defaults to a file inside `data_dir`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}
