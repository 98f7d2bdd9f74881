// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Event sync: flush the unsynced backlog to the backend

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{Backend, DeviceStatus, StatusUpdate};
use crate::db::{Database, DeviceCredentials, StoreError};

/// Outcome of one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
}

impl SyncReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.synced
    }
}

pub struct SyncEngine {
    store: Arc<Database>,
    backend: Arc<dyn Backend>,
}

impl SyncEngine {
    pub fn new(store: Arc<Database>, backend: Arc<dyn Backend>) -> Self {
        Self { store, backend }
    }

    /// Send every unsynced event in insertion order and mark the delivered
    /// ones in a single batch at the end. Undelivered events wait for the
    /// next pass; a crash before the batch only causes re-delivery.
    pub async fn sync_pending(
        &self,
        credentials: Option<&DeviceCredentials>,
    ) -> Result<SyncReport, StoreError> {
        let Some(credentials) = credentials else {
            debug!("Sync skipped: device not paired");
            return Ok(SyncReport::default());
        };

        let pending = self.store.list_unsynced()?;
        if pending.is_empty() {
            return Ok(SyncReport::default());
        }

        let mut delivered = Vec::with_capacity(pending.len());
        for event in &pending {
            let update = StatusUpdate::new(DeviceStatus::from_anomaly(event.is_anomaly), event.score);
            match self.backend.send_status(credentials, &update).await {
                Ok(()) => delivered.push(event.id),
                Err(e) => warn!("Event {} not synced: {}", event.id, e),
            }
        }

        self.store.mark_synced(&delivered)?;

        let report = SyncReport {
            attempted: pending.len(),
            synced: delivered.len(),
        };
        info!("Synced {}/{} events", report.synced, report.attempted);
        Ok(report)
    }
}
