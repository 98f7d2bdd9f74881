// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Audio capture

use anyhow::Result;
use async_trait::async_trait;

/// Records fixed-length mono clips
#[async_trait]
pub trait AudioSource: Send {
    /// Record `n_samples` mono samples at `sample_rate` Hz
    async fn record(&mut self, n_samples: usize, sample_rate: u32) -> Result<Vec<f32>>;
}

#[cfg(feature = "audio")]
pub use capture::CpalSource;

#[cfg(feature = "audio")]
mod capture {
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use anyhow::{anyhow, bail, Context, Result};
    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tracing::{info, warn};

    use super::AudioSource;

    /// Slack on top of the clip length before a capture is abandoned
    const CAPTURE_GRACE: Duration = Duration::from_secs(2);

    /// Default input device of the default host
    pub struct CpalSource {
        device_name: String,
    }

    impl CpalSource {
        /// Fails when the host has no input device
        pub fn probe() -> Result<Self> {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or_else(|| anyhow!("no audio input device"))?;
            let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
            info!("Audio input: {}", device_name);
            Ok(Self { device_name })
        }

        pub fn device_name(&self) -> &str {
            &self.device_name
        }
    }

    #[async_trait]
    impl AudioSource for CpalSource {
        async fn record(&mut self, n_samples: usize, sample_rate: u32) -> Result<Vec<f32>> {
            tokio::task::spawn_blocking(move || record_blocking(n_samples, sample_rate))
                .await
                .context("audio capture task panicked")?
        }
    }

    fn record_blocking(n_samples: usize, sample_rate: u32) -> Result<Vec<f32>> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| anyhow!("no audio input device"))?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = mpsc::channel::<Vec<f32>>();
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(data.to_vec());
            },
            |err| warn!("Audio stream error: {}", err),
            None,
        )?;
        stream.play()?;

        let clip = Duration::from_secs_f64(n_samples as f64 / sample_rate.max(1) as f64);
        let deadline = Instant::now() + clip + CAPTURE_GRACE;

        let mut out = Vec::with_capacity(n_samples);
        while out.len() < n_samples {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bail!("audio capture timed out after {} of {} samples", out.len(), n_samples);
            }
            match rx.recv_timeout(remaining) {
                Ok(chunk) => out.extend(chunk),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => bail!("audio stream closed"),
            }
        }

        drop(stream);
        out.truncate(n_samples);
        Ok(out)
    }
}
