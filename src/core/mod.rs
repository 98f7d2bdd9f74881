// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Core module - the agent loop and its timers

mod engine;
mod scheduler;

pub use engine::{Agent, AgentError};
pub use scheduler::{Duty, Scheduler};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Counters for one agent run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    pub iterations: u64,
    pub events_recorded: u64,
    pub anomalies: u64,
    pub sensing_failures: u64,
    pub pushes: u64,
    pub push_failures: u64,
    pub events_synced: u64,
    pub heartbeats: u64,
}

/// Cooperative stop signal, safe to clone into other threads and tasks
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Sleep for `duration`, waking early on stop. Returns true if stopped.
    pub async fn sleep_or_stop(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => true,
            _ = tokio::time::sleep(duration) => self.is_stopped(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_stop_wakes_sleeper() {
        let handle = StopHandle::new();
        let remote = handle.clone();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.stop();
        });

        let started = Instant::now();
        assert!(handle.sleep_or_stop(Duration::from_secs(30)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn test_sleep_completes_without_stop() {
        let handle = StopHandle::new();
        assert!(!handle.sleep_or_stop(Duration::from_millis(5)).await);
        assert!(!handle.is_stopped());
    }
}
