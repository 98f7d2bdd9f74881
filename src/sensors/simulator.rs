// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Simulated sound detector for demo/testing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::{Exp, Poisson};

use super::discrete::{EdgeSource, SoundEventLog};

const TICK: Duration = Duration::from_millis(100);

/// Background sound as a Poisson process, with occasional bursts
/// dense enough to trip the anomaly trigger
pub struct SimulatedEdgeSource {
    background_rate: f64,
    burst_probability: f64,
    burst_mean_edges: f64,
    seed: Option<u64>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedEdgeSource {
    pub fn new() -> Self {
        Self {
            background_rate: 0.3,
            burst_probability: 0.005,
            burst_mean_edges: 8.0,
            seed: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Edges per second outside bursts
    pub fn with_background_rate(mut self, rate: f64) -> Self {
        self.background_rate = rate.max(0.0);
        self
    }

    /// Chance per 100 ms tick of a burst starting
    pub fn with_burst_probability(mut self, probability: f64) -> Self {
        self.burst_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for SimulatedEdgeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeSource for SimulatedEdgeSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn start(&mut self, log: SoundEventLog) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let background = if self.background_rate > 0.0 {
            Some(Exp::new(self.background_rate).context("invalid background rate")?)
        } else {
            None
        };
        let burst = Poisson::new(self.burst_mean_edges).context("invalid burst size")?;
        let burst_probability = self.burst_probability;

        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();

        let worker = thread::Builder::new()
            .name("sound-simulator".to_string())
            .spawn(move || {
                let mut next_background = background
                    .map(|exp| Instant::now() + Duration::from_secs_f64(exp.sample(&mut rng)));

                while !stop.load(Ordering::Relaxed) {
                    let now = Instant::now();

                    if let (Some(exp), Some(due)) = (background, next_background) {
                        if now >= due {
                            log.record_at(now);
                            next_background = Some(now + Duration::from_secs_f64(exp.sample(&mut rng)));
                        }
                    }

                    if rng.gen_bool(burst_probability) {
                        let edges = burst.sample(&mut rng) as u64;
                        for i in 0..edges {
                            log.record_at(now + Duration::from_millis(i * 150));
                        }
                    }

                    thread::sleep(TICK);
                }
            })
            .context("failed to spawn sound simulator")?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
