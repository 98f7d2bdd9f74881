// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Interval timers for the periodic duties of the main loop

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::ScheduleConfig;

/// Periodic work the loop performs besides sensing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Duty {
    /// Flush the unsynced backlog
    Sync,
    /// Liveness ping
    Heartbeat,
    /// Real-time push of the latest sample
    StatusPush,
}

impl Duty {
    pub const ALL: [Duty; 3] = [Duty::Sync, Duty::Heartbeat, Duty::StatusPush];

    fn index(self) -> usize {
        match self {
            Duty::Sync => 0,
            Duty::Heartbeat => 1,
            Duty::StatusPush => 2,
        }
    }
}

impl std::fmt::Display for Duty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Duty::Sync => write!(f, "sync"),
            Duty::Heartbeat => write!(f, "heartbeat"),
            Duty::StatusPush => write!(f, "status push"),
        }
    }
}

/// One timer per [`Duty`]. A duty is due once its interval has elapsed since
/// it was last marked; the caller marks it whether or not the work succeeded.
pub struct Scheduler {
    intervals: [Duration; 3],
    last_run: [Option<Instant>; 3],
}

impl Scheduler {
    pub fn new(config: &ScheduleConfig) -> Self {
        Self::with_intervals(
            config.sync_interval(),
            config.heartbeat_interval(),
            config.status_update_interval(),
        )
    }

    pub fn with_intervals(sync: Duration, heartbeat: Duration, status_push: Duration) -> Self {
        Self {
            intervals: [sync, heartbeat, status_push],
            last_run: [None; 3],
        }
    }

    /// Arm the timers. Sync and heartbeat first fire one interval after
    /// `now`; the status push is due immediately.
    pub fn start(&mut self, now: Instant) {
        self.last_run = [Some(now), Some(now), None];
        debug!(
            "Timers armed: sync every {:?}, heartbeat every {:?}, push every {:?}",
            self.intervals[0], self.intervals[1], self.intervals[2]
        );
    }

    pub fn interval(&self, duty: Duty) -> Duration {
        self.intervals[duty.index()]
    }

    /// Due once the time since the last run exceeds the interval.
    /// A zero interval is due on every iteration.
    pub fn is_due(&self, duty: Duty, now: Instant) -> bool {
        let interval = self.intervals[duty.index()];
        match self.last_run[duty.index()] {
            None => true,
            Some(_) if interval.is_zero() => true,
            Some(last) => now.saturating_duration_since(last) > interval,
        }
    }

    pub fn mark(&mut self, duty: Duty, now: Instant) {
        self.last_run[duty.index()] = Some(now);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(&ScheduleConfig::default())
    }
}
