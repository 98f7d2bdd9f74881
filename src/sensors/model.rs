// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Model-scored audio sensing

use std::path::Path;

use anyhow::{bail, Result};
use async_trait::async_trait;
use ndarray::Array2;
use rand::prelude::*;
use tracing::debug;

use super::audio::AudioSource;
use super::features::MelExtractor;
use super::{Sample, SoundSensor};
use crate::config::AudioConfig;

/// Upper bound of the development stand-in score
pub const STAND_IN_MAX_SCORE: f64 = 0.2;

/// Autoencoder-style model: returns its reconstruction of a feature patch
pub trait ReconstructionModel: Send + Sync {
    fn infer(&self, patch: &Array2<f32>) -> Result<Array2<f32>>;
}

/// Loads a trained checkpoint into a ready model
pub trait ModelLoader {
    fn load(&self, checkpoint: &Path) -> Result<Box<dyn ReconstructionModel>>;
}

/// Mean squared error between a patch and its reconstruction
pub fn reconstruction_error(patch: &Array2<f32>, reconstructed: &Array2<f32>) -> Result<f64> {
    if patch.dim() != reconstructed.dim() {
        bail!(
            "reconstruction shape {:?} does not match input {:?}",
            reconstructed.dim(),
            patch.dim()
        );
    }
    if patch.is_empty() {
        return Ok(0.0);
    }

    let sum: f64 = patch
        .iter()
        .zip(reconstructed.iter())
        .map(|(&a, &b)| {
            let d = a as f64 - b as f64;
            d * d
        })
        .sum();

    Ok(sum / patch.len() as f64)
}

/// Records a clip, extracts a log-mel patch and scores it by reconstruction error
pub struct ModelScoredSensor {
    source: Box<dyn AudioSource>,
    extractor: MelExtractor,
    model: Box<dyn ReconstructionModel>,
    config: AudioConfig,
}

impl ModelScoredSensor {
    pub fn new(
        source: Box<dyn AudioSource>,
        model: Box<dyn ReconstructionModel>,
        config: &AudioConfig,
    ) -> Self {
        Self {
            source,
            extractor: MelExtractor::from_config(config),
            model,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl SoundSensor for ModelScoredSensor {
    fn name(&self) -> &str {
        "model-scored audio"
    }

    async fn sample(&mut self) -> Result<Sample> {
        let audio = self
            .source
            .record(self.config.chunk_samples(), self.config.sample_rate)
            .await?;

        let patch = self.extractor.extract(&audio, self.config.sample_rate);
        let reconstructed = self.model.infer(&patch)?;
        let mse = reconstruction_error(&patch, &reconstructed)?;

        debug!(samples = audio.len(), mse, "clip scored");
        Ok(Sample::scored(mse, self.config.anomaly_threshold))
    }
}

/// Development stand-in used when no audio backend or model is available.
/// Scores are pseudo-random in `[0, 0.2)` and carry no signal.
pub struct StandInSensor {
    rng: StdRng,
    threshold: f64,
}

impl StandInSensor {
    pub fn new(threshold: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            threshold,
        }
    }

    pub fn with_seed(threshold: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            threshold,
        }
    }
}

#[async_trait]
impl SoundSensor for StandInSensor {
    fn name(&self) -> &str {
        "development stand-in"
    }

    async fn sample(&mut self) -> Result<Sample> {
        let score = self.rng.gen::<f64>() * STAND_IN_MAX_SCORE;
        Ok(Sample::scored(score, self.threshold))
    }
}
