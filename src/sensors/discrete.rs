// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Discrete-event sensing: a threshold sound detector that emits edges

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{Sample, SoundSensor};
use crate::config::SoundSensorConfig;

/// Sliding log of edge timestamps, shared between an edge source and the sensor
#[derive(Clone, Default)]
pub struct SoundEventLog {
    events: Arc<Mutex<VecDeque<Instant>>>,
}

impl SoundEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) {
        self.record_at(Instant::now());
    }

    pub fn record_at(&self, at: Instant) {
        self.events.lock().push_back(at);
    }

    /// Drop edges older than `now - window` and count those in `[now - window, now]`.
    /// Sources may record out of order, so pruning scans the whole log.
    pub fn count_within(&self, now: Instant, window: Duration) -> usize {
        let mut events = self.events.lock();
        if let Some(cutoff) = now.checked_sub(window) {
            events.retain(|&t| t >= cutoff);
        }
        events.iter().filter(|&&t| t <= now).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

/// Anything that reports detector edges into a [`SoundEventLog`]
pub trait EdgeSource: Send {
    fn name(&self) -> &str;

    /// Begin delivering edges; runs until [`EdgeSource::stop`]
    fn start(&mut self, log: SoundEventLog) -> Result<()>;

    fn stop(&mut self);
}

/// Stands in for a detector that could not be opened; never reports an edge
pub struct SilentEdgeSource {
    name: String,
}

impl SilentEdgeSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl EdgeSource for SilentEdgeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, _log: SoundEventLog) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Counts edges in a sliding window and reports the count as the score
pub struct DiscreteEventSensor {
    source: Box<dyn EdgeSource>,
    log: SoundEventLog,
    window: Duration,
    trigger_count: usize,
    full_scale_count: usize,
    name: String,
}

impl DiscreteEventSensor {
    /// Start `source` and attach it to a fresh event log
    pub fn start(mut source: Box<dyn EdgeSource>, config: &SoundSensorConfig) -> Result<Self> {
        let log = SoundEventLog::new();
        source.start(log.clone())?;
        info!(
            "Sound detector: {} ({} edges in {:.1}s is anomalous)",
            source.name(),
            config.trigger_count,
            config.window_secs
        );

        Ok(Self {
            name: format!("discrete events ({})", source.name()),
            source,
            log,
            window: config.window(),
            trigger_count: config.trigger_count,
            full_scale_count: config.full_scale_count.max(1),
        })
    }

    pub fn log(&self) -> &SoundEventLog {
        &self.log
    }

    /// Evaluate the window ending at `now`
    pub fn sample_at(&self, now: Instant) -> Sample {
        let count = self.log.count_within(now, self.window);
        let score = (count as f64 / self.full_scale_count as f64).min(1.0);

        Sample {
            score,
            is_anomaly: count >= self.trigger_count,
            sound_count: Some(count),
        }
    }
}

#[async_trait]
impl SoundSensor for DiscreteEventSensor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sample(&mut self) -> Result<Sample> {
        let sample = self.sample_at(Instant::now());
        if let Some(count) = sample.sound_count {
            if count > 0 {
                debug!(count, score = sample.score, "sound events in window");
            }
        }
        Ok(sample)
    }

    fn shutdown(&mut self) {
        self.source.stop();
    }
}

impl Drop for DiscreteEventSensor {
    fn drop(&mut self) {
        self.source.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Edge source driven by hand from the test
    #[derive(Default)]
    struct ManualEdges {
        log: Option<SoundEventLog>,
        stopped: Arc<AtomicBool>,
    }

    impl EdgeSource for ManualEdges {
        fn name(&self) -> &str {
            "manual"
        }

        fn start(&mut self, log: SoundEventLog) -> Result<()> {
            self.log = Some(log);
            Ok(())
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn config(window_secs: f64, trigger_count: usize) -> SoundSensorConfig {
        SoundSensorConfig {
            window_secs,
            trigger_count,
            full_scale_count: 10,
            ..SoundSensorConfig::default()
        }
    }

    #[test]
    fn test_window_prunes_old_edges() {
        let log = SoundEventLog::new();
        let t0 = Instant::now();
        for s in [0, 1, 2, 6, 7] {
            log.record_at(t0 + Duration::from_secs(s));
        }

        // Window [2, 7] keeps the edges at 2, 6 and 7
        assert_eq!(log.count_within(t0 + Duration::from_secs(7), Duration::from_secs(5)), 3);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_out_of_order_edges_leave_the_window() {
        let log = SoundEventLog::new();
        let t0 = Instant::now();
        // A burst scheduled ahead of time, then a late edge behind it
        for i in 0..8 {
            log.record_at(t0 + Duration::from_millis(i * 150));
        }
        log.record_at(t0 + Duration::from_millis(100));

        // Window [160ms, 5160ms] keeps the burst edges from 300ms on
        let now = t0 + Duration::from_millis(5160);
        assert_eq!(log.count_within(now, Duration::from_secs(5)), 6);
        assert_eq!(log.len(), 6);
    }

    #[test]
    fn test_count_can_only_shrink_without_new_edges() {
        let log = SoundEventLog::new();
        let t0 = Instant::now();
        for s in [0, 1, 2] {
            log.record_at(t0 + Duration::from_secs(s));
        }
        let window = Duration::from_secs(5);

        assert_eq!(log.count_within(t0 + Duration::from_secs(3), window), 3);
        assert_eq!(log.count_within(t0 + Duration::from_secs(6), window), 2);
        assert_eq!(log.count_within(t0 + Duration::from_secs(20), window), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn test_trigger_count_and_score() {
        let sensor = DiscreteEventSensor::start(Box::new(ManualEdges::default()), &config(5.0, 5))
            .unwrap();
        let t0 = Instant::now();

        for i in 0..4 {
            sensor.log().record_at(t0 + Duration::from_millis(i * 100));
        }
        let sample = sensor.sample_at(t0 + Duration::from_secs(1));
        assert_eq!(sample.sound_count, Some(4));
        assert!(!sample.is_anomaly);
        assert!((sample.score - 0.4).abs() < 1e-12);

        sensor.log().record_at(t0 + Duration::from_millis(500));
        let sample = sensor.sample_at(t0 + Duration::from_secs(1));
        assert_eq!(sample.sound_count, Some(5));
        assert!(sample.is_anomaly);
    }

    #[test]
    fn test_score_saturates_at_full_scale() {
        let sensor = DiscreteEventSensor::start(Box::new(ManualEdges::default()), &config(5.0, 5))
            .unwrap();
        let t0 = Instant::now();
        for i in 0..25 {
            sensor.log().record_at(t0 + Duration::from_millis(i * 10));
        }
        let sample = sensor.sample_at(t0 + Duration::from_secs(1));
        assert_eq!(sample.sound_count, Some(25));
        assert_eq!(sample.score, 1.0);
    }

    #[tokio::test]
    async fn test_quiet_window_and_shutdown() {
        let source = ManualEdges::default();
        let stopped = source.stopped.clone();
        let mut sensor = DiscreteEventSensor::start(Box::new(source), &config(5.0, 5)).unwrap();

        let sample = sensor.sample().await.unwrap();
        assert_eq!(sample.sound_count, Some(0));
        assert_eq!(sample.score, 0.0);
        assert!(!sample.is_anomaly);

        sensor.shutdown();
        assert!(stopped.load(Ordering::SeqCst));
    }
}
