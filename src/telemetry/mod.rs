// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Host telemetry attached to status pushes

use serde::Serialize;
use sysinfo::{Components, System};

use crate::backend::StatusUpdate;

/// Point-in-time host readings. Missing readings are left out of the wire body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DeviceTelemetry {
    /// Percent across all cores
    pub cpu_usage: Option<f32>,
    /// Percent of physical memory in use
    pub memory_usage: Option<f32>,
    /// Hottest sensor, degrees Celsius
    pub temperature: Option<f32>,
}

impl DeviceTelemetry {
    pub fn apply(&self, update: &mut StatusUpdate) {
        update.cpu_usage = self.cpu_usage;
        update.memory_usage = self.memory_usage;
        update.temperature = self.temperature;
    }
}

/// Keeps the sysinfo handles alive so CPU usage is measured between calls
pub struct TelemetryProbe {
    system: System,
    components: Components,
}

impl TelemetryProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            system,
            components: Components::new_with_refreshed_list(),
        }
    }

    pub fn read(&mut self) -> DeviceTelemetry {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.components.refresh();

        let cpu = self.system.global_cpu_info().cpu_usage();
        let total = self.system.total_memory();
        let memory_usage = (total > 0).then(|| (self.system.used_memory() as f64 / total as f64 * 100.0) as f32);

        let temperature = self
            .components
            .iter()
            .map(|c| c.temperature())
            .filter(|t| t.is_finite() && *t > 0.0)
            .fold(None, |hottest: Option<f32>, t| Some(hottest.map_or(t, |h| h.max(t))));

        DeviceTelemetry {
            cpu_usage: cpu.is_finite().then_some(cpu),
            memory_usage,
            temperature,
        }
    }

    /// Fill the optional telemetry fields of `update`
    pub fn enrich(&mut self, update: &mut StatusUpdate) {
        self.read().apply(update);
    }
}

impl Default for TelemetryProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceStatus;

    #[test]
    fn test_readings_are_in_range() {
        let mut probe = TelemetryProbe::new();
        let reading = probe.read();

        if let Some(memory) = reading.memory_usage {
            assert!((0.0..=100.0).contains(&memory));
        }
        if let Some(cpu) = reading.cpu_usage {
            assert!(cpu >= 0.0);
        }
    }

    #[test]
    fn test_apply_keeps_status_and_score() {
        let telemetry = DeviceTelemetry {
            cpu_usage: Some(12.0),
            memory_usage: Some(48.5),
            temperature: None,
        };
        let mut update = StatusUpdate::new(DeviceStatus::Abnormal, 0.3);
        telemetry.apply(&mut update);

        assert_eq!(update.status, DeviceStatus::Abnormal);
        assert_eq!(update.anomaly_score, 0.3);
        assert_eq!(update.cpu_usage, Some(12.0));
        assert_eq!(update.memory_usage, Some(48.5));
        assert_eq!(update.temperature, None);
    }
}
