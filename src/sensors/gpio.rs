// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Sound detector on a GPIO input, read through the Linux sysfs interface

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use super::discrete::{EdgeSource, SoundEventLog};
use crate::config::SoundSensorConfig;

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Polls `gpio<N>/value` and records debounced rising edges
pub struct GpioEdgeSource {
    root: PathBuf,
    pin: u32,
    poll_interval: Duration,
    debounce: Duration,
    exported_here: bool,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    name: String,
}

impl GpioEdgeSource {
    pub fn new(config: &SoundSensorConfig) -> Self {
        Self::with_root(SYSFS_GPIO_ROOT, config)
    }

    pub fn with_root(root: impl Into<PathBuf>, config: &SoundSensorConfig) -> Self {
        Self {
            root: root.into(),
            pin: config.gpio_pin,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            debounce: Duration::from_millis(config.debounce_ms),
            exported_here: false,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            name: format!("gpio{}", config.gpio_pin),
        }
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn export(&mut self) -> Result<()> {
        if self.pin_dir().exists() {
            return Ok(());
        }

        let export = self.root.join("export");
        fs::write(&export, self.pin.to_string())
            .with_context(|| format!("failed to export GPIO {} via {}", self.pin, export.display()))?;
        self.exported_here = true;

        // The kernel creates the pin directory asynchronously after export
        let deadline = Instant::now() + Duration::from_secs(1);
        while !self.pin_dir().exists() {
            if Instant::now() > deadline {
                bail!("GPIO {} did not appear after export", self.pin);
            }
            thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    fn unexport(&mut self) {
        if !self.exported_here {
            return;
        }
        if let Err(e) = fs::write(self.root.join("unexport"), self.pin.to_string()) {
            debug!("GPIO {} unexport failed: {}", self.pin, e);
        }
        self.exported_here = false;
    }
}

impl EdgeSource for GpioEdgeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, log: SoundEventLog) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        self.export()?;

        let direction = self.pin_dir().join("direction");
        if direction.exists() {
            if let Err(e) = fs::write(&direction, "in") {
                warn!("Could not set GPIO {} as input: {}", self.pin, e);
            }
        }

        let value_path = self.pin_dir().join("value");
        let mut reader = EdgeDetector::new(self.debounce);
        reader.level = read_level(&value_path)
            .with_context(|| format!("GPIO {} is not readable", self.pin))?;

        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();
        let poll_interval = self.poll_interval;

        let worker = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    // A partially written or vanished value file reads as "no change"
                    if let Ok(level) = read_level(&value_path) {
                        if let Some(at) = reader.update(level, Instant::now()) {
                            log.record_at(at);
                        }
                    }
                    thread::sleep(poll_interval);
                }
            })
            .context("failed to spawn GPIO reader")?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            self.unexport();
        }
    }
}

fn read_level(path: &Path) -> Result<bool> {
    let raw = fs::read_to_string(path)?;
    match raw.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => bail!("unexpected GPIO value {:?}", other),
    }
}

/// Rising-edge detection with a minimum spacing between accepted edges
struct EdgeDetector {
    level: bool,
    debounce: Duration,
    last_edge: Option<Instant>,
}

impl EdgeDetector {
    fn new(debounce: Duration) -> Self {
        Self {
            level: false,
            debounce,
            last_edge: None,
        }
    }

    fn update(&mut self, level: bool, now: Instant) -> Option<Instant> {
        let rising = level && !self.level;
        self.level = level;
        if !rising {
            return None;
        }

        if let Some(last) = self.last_edge {
            if now.duration_since(last) < self.debounce {
                return None;
            }
        }
        self.last_edge = Some(now);
        Some(now)
    }
}
