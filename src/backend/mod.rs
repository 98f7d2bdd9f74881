// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Backend module - device registration, pairing and status API

mod client;
mod models;

pub use client::HttpBackend;
pub use models::*;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::DeviceCredentials;

/// Failure of a single backend call. All variants are transient from the
/// agent's point of view: the call is skipped and retried on the next cycle.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Device API as consumed by the agent. Implementations never retry.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Announce a pairing code; Ok on HTTP 200 or 202
    async fn register_pending(
        &self,
        pairing_code: &str,
        mac: &str,
        hostname: &str,
    ) -> Result<RegistrationResult, BackendError>;

    /// `Ok(Some)` only once the backend reports a completed pairing
    async fn check_pairing(&self, pairing_code: &str) -> Result<Option<PairingResult>, BackendError>;

    /// Push one status update; Ok iff HTTP 200
    async fn send_status(
        &self,
        credentials: &DeviceCredentials,
        update: &StatusUpdate,
    ) -> Result<(), BackendError>;
}
