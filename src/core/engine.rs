// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Main agent loop

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{AgentStats, Duty, Scheduler, StopHandle};
use crate::backend::{Backend, DeviceStatus, StatusUpdate};
use crate::config::Config;
use crate::db::{Database, StoreError};
use crate::net::Connectivity;
use crate::pairing::{DeviceIdentity, PairingMachine, PairingState};
use crate::sensors::{Sample, SoundSensor};
use crate::sync::SyncEngine;
use crate::telemetry::TelemetryProbe;

/// Failures that end the run. Network and sensing problems never get here.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("local storage failed: {0}")]
    Store(#[from] StoreError),
}

/// Sense, persist, push, sync and heartbeat, one step after another
pub struct Agent {
    store: Arc<Database>,
    backend: Arc<dyn Backend>,
    connectivity: Arc<dyn Connectivity>,
    sensor: Box<dyn SoundSensor>,
    pairing: PairingMachine,
    sync: SyncEngine,
    telemetry: Option<TelemetryProbe>,
    scheduler: Scheduler,
    stop: StopHandle,
    stats: AgentStats,
    loop_delay: Duration,
    pairing_poll_interval: Duration,
    reregister_every: u32,
    persist_quiet_samples: bool,
    device_name: String,
}

impl Agent {
    pub fn new(
        config: &Config,
        store: Arc<Database>,
        backend: Arc<dyn Backend>,
        connectivity: Arc<dyn Connectivity>,
        sensor: Box<dyn SoundSensor>,
        identity: DeviceIdentity,
    ) -> Result<Self, AgentError> {
        let pairing = PairingMachine::load(store.clone(), backend.clone(), identity)?;
        let sync = SyncEngine::new(store.clone(), backend.clone());

        let mut scheduler = Scheduler::new(&config.schedule);
        scheduler.start(Instant::now());

        Ok(Self {
            store,
            backend,
            connectivity,
            sensor,
            pairing,
            sync,
            telemetry: Some(TelemetryProbe::new()),
            scheduler,
            stop: StopHandle::new(),
            stats: AgentStats::default(),
            loop_delay: config.schedule.loop_delay(),
            pairing_poll_interval: config.schedule.pairing_poll_interval(),
            reregister_every: config.schedule.reregister_every,
            persist_quiet_samples: config.sound_sensor.persist_quiet_samples,
            device_name: config.device_name.clone(),
        })
    }

    /// Send status pushes without host telemetry
    pub fn without_telemetry(mut self) -> Self {
        self.telemetry = None;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn pairing(&self) -> &PairingMachine {
        &self.pairing
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    /// Forget the paired identity so the next run pairs again
    pub fn reset_identity(&mut self) -> Result<(), AgentError> {
        self.pairing.reset()?;
        Ok(())
    }

    /// Run until stopped. Returns `Err` only when local storage fails.
    pub async fn run(&mut self) -> Result<AgentStats, AgentError> {
        info!("Agent '{}' starting with {}", self.device_name, self.sensor.name());

        if !self.connectivity.is_online().await {
            warn!("No connectivity; events will be buffered locally");
        }

        if !self.pairing.is_paired() && !self.pair().await? {
            info!("Stopped before pairing completed");
            return Ok(self.finish());
        }

        if let Some(credentials) = self.pairing.credentials() {
            info!("Paired as {}", credentials.device_id);
        }
        self.scheduler.start(Instant::now());

        while !self.stop.is_stopped() {
            self.step().await?;
            if self.stop.sleep_or_stop(self.loop_delay).await {
                break;
            }
        }

        Ok(self.finish())
    }

    /// Blocks until paired or stopped. Polls only while online and
    /// re-announces the code every `reregister_every` unanswered polls.
    async fn pair(&mut self) -> Result<bool, AgentError> {
        if let Some(code) = self.pairing.start_pairing().await? {
            info!("Enter pairing code {} in the dashboard to claim this device", code);
        }

        let mut unanswered = 0u32;
        while !self.stop.is_stopped() {
            if self.connectivity.is_online().await {
                if self.pairing.poll_pairing().await? {
                    return Ok(true);
                }
                unanswered += 1;
                if self.reregister_every > 0 && unanswered % self.reregister_every == 0 {
                    debug!("Re-registering after {} unanswered polls", unanswered);
                    self.pairing.register_again().await;
                }
            } else {
                debug!("Offline; pairing poll skipped");
            }

            if self.stop.sleep_or_stop(self.pairing_poll_interval).await {
                break;
            }
        }

        Ok(self.pairing.state() == PairingState::Paired)
    }

    /// One loop iteration
    pub async fn step(&mut self) -> Result<(), AgentError> {
        self.stats.iterations += 1;

        let sample = match self.sensor.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Sensing failed, recording a neutral sample: {:#}", e);
                self.stats.sensing_failures += 1;
                Sample::neutral()
            }
        };

        if sample.is_anomaly {
            self.stats.anomalies += 1;
            match sample.sound_count {
                Some(count) => info!("Anomaly detected: {} sound events (score {:.3})", count, sample.score),
                None => info!("Anomaly detected: score {:.4}", sample.score),
            }
        } else {
            debug!(score = sample.score, "normal");
        }

        let quiet = sample.sound_count == Some(0);
        if !quiet || self.persist_quiet_samples {
            let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
            let id = self.store.append_event(&timestamp, sample.score, sample.is_anomaly)?;
            self.stats.events_recorded += 1;
            debug!("Stored event {}", id);
        }

        let online = self.connectivity.is_online().await;
        let now = Instant::now();

        if self.scheduler.is_due(Duty::StatusPush, now) && online && self.pairing.is_paired() {
            let update = StatusUpdate::new(DeviceStatus::from_anomaly(sample.is_anomaly), sample.score);
            if self.push(update).await {
                self.stats.pushes += 1;
            } else {
                self.stats.push_failures += 1;
            }
            self.scheduler.mark(Duty::StatusPush, now);
        }

        if self.scheduler.is_due(Duty::Sync, now) {
            if online {
                let report = self.sync.sync_pending(self.pairing.credentials()).await?;
                self.stats.events_synced += report.synced as u64;
            }
            self.scheduler.mark(Duty::Sync, now);
        }

        if self.scheduler.is_due(Duty::Heartbeat, now) {
            if online && self.pairing.is_paired() && self.push(StatusUpdate::heartbeat()).await {
                self.stats.heartbeats += 1;
                debug!("Heartbeat sent");
            }
            self.scheduler.mark(Duty::Heartbeat, now);
        }

        Ok(())
    }

    /// Best-effort status push; failures are logged and dropped
    async fn push(&mut self, mut update: StatusUpdate) -> bool {
        let Some(credentials) = self.pairing.credentials() else {
            return false;
        };
        if let Some(telemetry) = self.telemetry.as_mut() {
            telemetry.enrich(&mut update);
        }

        match self.backend.send_status(credentials, &update).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Status push failed: {}", e);
                false
            }
        }
    }

    fn finish(&mut self) -> AgentStats {
        self.sensor.shutdown();

        match self.store.stats() {
            Ok(store) => info!(
                "Agent stopped after {} iterations: {} events recorded, {} anomalies, {} synced ({} still buffered)",
                self.stats.iterations,
                self.stats.events_recorded,
                self.stats.anomalies,
                self.stats.events_synced,
                store.unsynced_events
            ),
            Err(e) => warn!("Agent stopped; event log unreadable: {}", e),
        }

        self.stats.clone()
    }
}
