// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Backend wire models

use serde::{Deserialize, Serialize};

/// Body of `POST /device-registration/register-pending`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPendingRequest {
    pub pairing_code: String,
    pub mac: String,
    pub hostname: String,
}

/// Raw registration payload. The agent only logs it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationResult {
    pub payload: serde_json::Value,
}

/// Body of `GET /device-registration/check-pairing/{code}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPairingResponse {
    #[serde(default)]
    pub is_paired: bool,
    pub id: Option<String>,
    pub device_token: Option<String>,
    pub name: Option<String>,
}

/// A confirmed pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingResult {
    pub device_id: String,
    pub device_token: String,
    pub name: Option<String>,
}

impl CheckPairingResponse {
    /// Confirmed pairing only when the flag is set and both credentials are present
    pub fn into_result(self) -> Option<PairingResult> {
        if !self.is_paired {
            return None;
        }
        match (self.id, self.device_token) {
            (Some(device_id), Some(device_token)) if !device_id.is_empty() && !device_token.is_empty() => {
                Some(PairingResult { device_id, device_token, name: self.name })
            }
            _ => None,
        }
    }
}

/// Status reported to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Normal,
    Abnormal,
}

impl DeviceStatus {
    pub fn from_anomaly(is_anomaly: bool) -> Self {
        if is_anomaly {
            DeviceStatus::Abnormal
        } else {
            DeviceStatus::Normal
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Normal => write!(f, "normal"),
            DeviceStatus::Abnormal => write!(f, "abnormal"),
        }
    }
}

/// Body of `PATCH /devices/{id}/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: DeviceStatus,
    pub anomaly_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl StatusUpdate {
    pub fn new(status: DeviceStatus, anomaly_score: f64) -> Self {
        Self {
            status,
            anomaly_score,
            cpu_usage: None,
            memory_usage: None,
            temperature: None,
        }
    }

    /// Liveness ping: normal, score zero
    pub fn heartbeat() -> Self {
        Self::new(DeviceStatus::Normal, 0.0)
    }
}
