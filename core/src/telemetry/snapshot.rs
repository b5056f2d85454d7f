//! telemetry/snapshot.rs
//! Immutable view of counters and stage timings at the end of a run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::telemetry::counters::TelemetryCounters;
use crate::telemetry::timers::{Stage, StageTimes, TelemetryTimer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub counters: TelemetryCounters,
    pub frames_per_sec: f64,
    pub elapsed: Duration,
    pub stage_times: StageTimes,
}

impl TelemetrySnapshot {
    pub fn from(counters: &TelemetryCounters, timer: &TelemetryTimer) -> Self {
        let elapsed = timer.elapsed();
        let frames = counters.frames_emitted() + counters.frames_applied;

        let frames_per_sec = if elapsed.as_secs_f64() > 0.0 {
            frames as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        Self {
            counters: counters.clone(),
            frames_per_sec,
            elapsed,
            stage_times: timer.stage_times.clone(),
        }
    }

    pub fn total_stage_time(&self) -> Duration {
        self.stage_times.total()
    }

    pub fn has_all_stages(&self, expected: &[Stage]) -> bool {
        expected.iter().all(|s| self.stage_times.contains(*s))
    }

    /// Internal consistency:
    /// - exactly zero or one terminal frame
    /// - every resolved token was registered first
    /// - `total_stage_time() <= elapsed`
    pub fn sanity_check(&self) -> bool {
        let c = &self.counters;
        c.frames_terminal <= 1
            && c.tokens_resolved <= c.tokens_registered
            && self.total_stage_time() <= self.elapsed
    }
}
