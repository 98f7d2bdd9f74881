// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Sensor traits and common types

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One sensing result, normalized across modalities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Non-negative anomaly score
    pub score: f64,
    /// Decided once, when the sample is taken
    pub is_anomaly: bool,
    /// Raw edge count for discrete sensors
    pub sound_count: Option<usize>,
}

impl Sample {
    /// Classify a score against a threshold (strictly greater is anomalous)
    pub fn scored(score: f64, threshold: f64) -> Self {
        Self {
            score,
            is_anomaly: exceeds_threshold(score, threshold),
            sound_count: None,
        }
    }

    /// Result used when sensing fails: score 0, not anomalous
    pub fn neutral() -> Self {
        Self {
            score: 0.0,
            is_anomaly: false,
            sound_count: None,
        }
    }
}

/// `score > threshold`; a score equal to the threshold is normal
pub fn exceeds_threshold(score: f64, threshold: f64) -> bool {
    score > threshold
}

/// A capability that produces one detection sample per call
#[async_trait]
pub trait SoundSensor: Send {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Take one sample. May block for the length of a recording.
    async fn sample(&mut self) -> Result<Sample>;

    /// Release hardware. Called once when the agent stops.
    fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary_is_strict() {
        let threshold = 0.1;
        assert!(!Sample::scored(threshold, threshold).is_anomaly);

        let above = f64::from_bits(threshold.to_bits() + 1);
        assert!(above > threshold);
        assert!(Sample::scored(above, threshold).is_anomaly);

        assert!(!Sample::scored(0.0, threshold).is_anomaly);
    }

    #[test]
    fn test_neutral_sample() {
        let sample = Sample::neutral();
        assert_eq!(sample.score, 0.0);
        assert!(!sample.is_anomaly);
        assert_eq!(sample.sound_count, None);
    }
}
