// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! MachinaEar - acoustic anomaly detection edge agent
//!
//! Listens to a machine, scores every sample for anomalies, keeps every
//! result in a local SQLite log and reports to the backend whenever the
//! network allows.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Agent loop                        │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌─────────┐   ┌──────────┐   ┌──────────┐   ┌────────┐  │
//! │  │ Sensors │ → │ Database │ → │ Backend  │ ← │  Sync  │  │
//! │  └─────────┘   └──────────┘   └──────────┘   └────────┘  │
//! │                      ↑              ↑                    │
//! │               ┌──────────┐   ┌──────────────┐            │
//! │               │ Pairing  │   │ Connectivity │            │
//! │               └──────────┘   └──────────────┘            │
//! └──────────────────────────────────────────────────────────┘
//! ```

#![allow(dead_code)]

pub mod backend;
pub mod config;
pub mod core;
pub mod db;
pub mod net;
pub mod pairing;
pub mod sensors;
pub mod sync;
pub mod telemetry;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use backend::{Backend, HttpBackend};
pub use config::{Config, SensingMode};
pub use core::{Agent, AgentError, AgentStats, StopHandle};
pub use db::Database;
pub use net::{Connectivity, HttpProbe};
pub use pairing::{DeviceIdentity, PairingMachine, PairingState};
pub use sensors::{build_sensor, Sample, SoundSensor};
pub use sync::SyncEngine;

/// Agent version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Agent name
pub const NAME: &str = "MachinaEar";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        features: enabled_features(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: String,
    pub target: String,
    pub os: String,
    pub features: Vec<String>,
}

fn enabled_features() -> Vec<String> {
    let mut features = vec![];

    #[cfg(feature = "audio")]
    features.push("audio".to_string());

    features
}
