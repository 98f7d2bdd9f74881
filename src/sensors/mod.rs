// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Sensor module - sound sensing variants
//!
//! Two capabilities sit behind [`SoundSensor`]:
//! - model-scored audio: record a clip, score it by autoencoder reconstruction error
//! - discrete events: count detector edges in a sliding window
//!
//! The variant is chosen once at startup by [`build_sensor`].

mod audio;
mod discrete;
pub mod features;
mod gpio;
mod model;
mod simulator;
mod traits;

pub use audio::AudioSource;
#[cfg(feature = "audio")]
pub use audio::CpalSource;
pub use discrete::{DiscreteEventSensor, EdgeSource, SilentEdgeSource, SoundEventLog};
pub use gpio::GpioEdgeSource;
pub use model::{
    reconstruction_error, ModelLoader, ModelScoredSensor, ReconstructionModel, StandInSensor,
    STAND_IN_MAX_SCORE,
};
pub use simulator::SimulatedEdgeSource;
pub use traits::{exceeds_threshold, Sample, SoundSensor};

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::{AudioConfig, Config, SensingMode, SoundSensorConfig};

/// Pick and start the sensing variant for `config.mode`.
///
/// `loader` turns the configured checkpoint into a model. Audio mode falls
/// back to the development stand-in when capture, checkpoint or loader is
/// missing. GPIO mode never invents edges: an unusable pin leaves a silent
/// detector that reports zero counts.
pub fn build_sensor(config: &Config, loader: Option<&dyn ModelLoader>) -> Result<Box<dyn SoundSensor>> {
    let sensor: Box<dyn SoundSensor> = match config.mode {
        SensingMode::Audio => build_audio_sensor(&config.audio, loader),
        SensingMode::Gpio => {
            let gpio = GpioEdgeSource::new(&config.sound_sensor);
            Box::new(build_gpio_sensor(gpio, &config.sound_sensor)?)
        }
        SensingMode::Simulated => Box::new(DiscreteEventSensor::start(
            Box::new(SimulatedEdgeSource::new()),
            &config.sound_sensor,
        )?),
    };

    info!("Sensing with {}", sensor.name());
    Ok(sensor)
}

fn build_gpio_sensor(gpio: GpioEdgeSource, config: &SoundSensorConfig) -> Result<DiscreteEventSensor> {
    let name = gpio.name().to_string();
    match DiscreteEventSensor::start(Box::new(gpio), config) {
        Ok(sensor) => Ok(sensor),
        Err(e) => {
            error!("Sound detector {} unavailable ({:#}); no sound will be counted", name, e);
            DiscreteEventSensor::start(
                Box::new(SilentEdgeSource::new(format!("{} unavailable", name))),
                config,
            )
        }
    }
}

fn build_audio_sensor(config: &AudioConfig, loader: Option<&dyn ModelLoader>) -> Box<dyn SoundSensor> {
    let model = match (loader, &config.model_path) {
        (Some(loader), Some(path)) => match loader.load(path) {
            Ok(model) => Some(model),
            Err(e) => {
                warn!("Failed to load model {}: {:#}", path.display(), e);
                None
            }
        },
        (None, Some(path)) => {
            warn!("No model runtime available for {}", path.display());
            None
        }
        (_, None) => {
            warn!("No model checkpoint configured");
            None
        }
    };

    match (model, open_audio_source()) {
        (Some(model), Some(source)) => Box::new(ModelScoredSensor::new(source, model, config)),
        _ => {
            warn!("Using development stand-in scores; detections carry no signal");
            Box::new(StandInSensor::new(config.anomaly_threshold))
        }
    }
}

#[cfg(feature = "audio")]
fn open_audio_source() -> Option<Box<dyn AudioSource>> {
    match CpalSource::probe() {
        Ok(source) => Some(Box::new(source)),
        Err(e) => {
            warn!("Audio capture unavailable: {:#}", e);
            None
        }
    }
}

#[cfg(not(feature = "audio"))]
fn open_audio_source() -> Option<Box<dyn AudioSource>> {
    warn!("Built without the `audio` feature; no capture available");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_audio_mode_without_model_uses_stand_in() {
        let config = Config {
            mode: SensingMode::Audio,
            ..Config::default()
        };
        let mut sensor = build_sensor(&config, None).unwrap();
        assert_eq!(sensor.name(), "development stand-in");

        let sample = sensor.sample().await.unwrap();
        assert!(sample.score < STAND_IN_MAX_SCORE);
        assert_eq!(sample.sound_count, None);
    }

    #[tokio::test]
    async fn test_unusable_gpio_pin_stays_silent() {
        let root = tempfile::tempdir().unwrap();
        let config = SoundSensorConfig {
            gpio_pin: 4,
            ..SoundSensorConfig::default()
        };
        let gpio = GpioEdgeSource::with_root(root.path(), &config);
        let mut sensor = build_gpio_sensor(gpio, &config).unwrap();
        assert!(sensor.name().contains("gpio4 unavailable"));

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let sample = sensor.sample().await.unwrap();
        assert_eq!(sample.sound_count, Some(0));
        assert_eq!(sample.score, 0.0);
        assert!(!sample.is_anomaly);
        assert!(sensor.log().is_empty());
        sensor.shutdown();
    }

    #[tokio::test]
    async fn test_simulated_mode_reports_counts() {
        let config = Config {
            mode: SensingMode::Simulated,
            ..Config::default()
        };
        let mut sensor = build_sensor(&config, None).unwrap();
        assert!(sensor.name().contains("simulated"));

        let sample = sensor.sample().await.unwrap();
        assert!(sample.sound_count.is_some());
        sensor.shutdown();
    }
}
