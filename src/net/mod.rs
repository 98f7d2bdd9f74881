// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Connectivity probe

use async_trait::async_trait;
use tracing::debug;

use crate::config::BackendConfig;

/// Reachability check consulted before every network-dependent step
#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Never fails: any error is reported as offline
    async fn is_online(&self) -> bool;
}

/// GET against a well-known endpoint with a short timeout
pub struct HttpProbe {
    http: Option<reqwest::Client>,
    url: String,
}

impl HttpProbe {
    pub fn new(config: &BackendConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .build()
            .map_err(|e| debug!("probe client unavailable: {}", e))
            .ok();

        Self {
            http,
            url: config.probe_url.clone(),
        }
    }
}

#[async_trait]
impl Connectivity for HttpProbe {
    async fn is_online(&self) -> bool {
        let Some(http) = &self.http else {
            return false;
        };

        match http.get(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %self.url, "connectivity probe failed: {}", e);
                false
            }
        }
    }
}
