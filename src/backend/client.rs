// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! HTTP client for the device API

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::{
    Backend, BackendError, CheckPairingResponse, PairingResult, RegisterPendingRequest,
    RegistrationResult, StatusUpdate,
};
use crate::config::BackendConfig;
use crate::db::DeviceCredentials;

/// reqwest-backed device API client
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("machinaear-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn status_error(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::Status { status, body }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn register_pending(
        &self,
        pairing_code: &str,
        mac: &str,
        hostname: &str,
    ) -> Result<RegistrationResult, BackendError> {
        let body = RegisterPendingRequest {
            pairing_code: pairing_code.to_string(),
            mac: mac.to_string(),
            hostname: hostname.to_string(),
        };

        let response = self
            .http
            .post(self.url("/device-registration/register-pending"))
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED => {
                let text = response.text().await?;
                let payload = if text.trim().is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))?
                };
                Ok(RegistrationResult { payload })
            }
            _ => Err(status_error(response).await),
        }
    }

    async fn check_pairing(&self, pairing_code: &str) -> Result<Option<PairingResult>, BackendError> {
        let response = self
            .http
            .get(self.url(&format!("/device-registration/check-pairing/{}", pairing_code)))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            debug!(status = response.status().as_u16(), "pairing not resolved yet");
            return Ok(None);
        }

        let text = response.text().await?;
        match serde_json::from_str::<CheckPairingResponse>(&text) {
            Ok(parsed) => Ok(parsed.into_result()),
            Err(e) => {
                warn!("Ignoring malformed pairing response: {}", e);
                Ok(None)
            }
        }
    }

    async fn send_status(
        &self,
        credentials: &DeviceCredentials,
        update: &StatusUpdate,
    ) -> Result<(), BackendError> {
        let response = self
            .http
            .patch(self.url(&format!("/devices/{}/status", credentials.device_id)))
            .bearer_auth(&credentials.device_token)
            .json(update)
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceStatus;
    use crate::test_support::OneShotServer;

    fn backend_for(server: &OneShotServer) -> HttpBackend {
        let config = BackendConfig {
            api_base_url: format!("{}/iam/", server.base_url()),
            request_timeout_secs: 2,
            ..BackendConfig::default()
        };
        HttpBackend::new(&config).unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let config = BackendConfig {
            api_base_url: "https://example.com/iam/".to_string(),
            ..BackendConfig::default()
        };
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.base_url(), "https://example.com/iam");
    }

    #[tokio::test]
    async fn test_register_pending_accepts_202() {
        let server = OneShotServer::start(202, r#"{"pairingCode":"AB12CD","status":"pending"}"#).await;
        let backend = backend_for(&server);

        let result = backend.register_pending("AB12CD", "AA:BB:CC:DD:EE:FF", "pi").await.unwrap();
        assert_eq!(result.payload["status"], "pending");

        let request = server.request().await;
        assert!(request.starts_with("POST /iam/device-registration/register-pending "));
        assert!(request.contains(r#""pairingCode":"AB12CD""#));
        assert!(request.contains(r#""hostname":"pi""#));
    }

    #[tokio::test]
    async fn test_register_pending_rejects_other_status() {
        let server = OneShotServer::start(409, "duplicate").await;
        let backend = backend_for(&server);

        match backend.register_pending("AB12CD", "mac", "pi").await {
            Err(BackendError::Status { status, body }) => {
                assert_eq!(status, 409);
                assert_eq!(body, "duplicate");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_pairing_paired() {
        let server =
            OneShotServer::start(200, r#"{"isPaired":true,"id":"dev-9","deviceToken":"tok-9"}"#).await;
        let backend = backend_for(&server);

        let result = backend.check_pairing("AB12CD").await.unwrap().unwrap();
        assert_eq!(result.device_id, "dev-9");
        assert_eq!(result.device_token, "tok-9");
        assert!(server
            .request()
            .await
            .starts_with("GET /iam/device-registration/check-pairing/AB12CD "));
    }

    #[tokio::test]
    async fn test_check_pairing_not_found_is_none() {
        let server = OneShotServer::start(404, "").await;
        let backend = backend_for(&server);
        assert!(backend.check_pairing("AB12CD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_check_pairing_malformed_is_none() {
        let server = OneShotServer::start(200, "<html>gateway</html>").await;
        let backend = backend_for(&server);
        assert!(backend.check_pairing("AB12CD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_status_uses_bearer_token() {
        let server = OneShotServer::start(200, "{}").await;
        let backend = backend_for(&server);
        let credentials = DeviceCredentials {
            device_id: "dev-9".to_string(),
            device_token: "tok-9".to_string(),
        };

        backend
            .send_status(&credentials, &StatusUpdate::new(DeviceStatus::Abnormal, 0.5))
            .await
            .unwrap();

        let request = server.request().await;
        assert!(request.starts_with("PATCH /iam/devices/dev-9/status "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer tok-9"));
        assert!(request.contains(r#""status":"abnormal""#));
    }

    #[tokio::test]
    async fn test_send_status_non_200_is_error() {
        let server = OneShotServer::start(204, "").await;
        let backend = backend_for(&server);
        let credentials = DeviceCredentials {
            device_id: "dev-9".to_string(),
            device_token: "tok-9".to_string(),
        };

        let result = backend.send_status(&credentials, &StatusUpdate::heartbeat()).await;
        assert!(matches!(result, Err(BackendError::Status { status: 204, .. })));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let config = BackendConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
            ..BackendConfig::default()
        };
        let backend = HttpBackend::new(&config).unwrap();
        assert!(matches!(
            backend.register_pending("AB12CD", "mac", "pi").await,
            Err(BackendError::Network(_))
        ));
    }
}
