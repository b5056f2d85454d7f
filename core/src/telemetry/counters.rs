//! telemetry/counters.rs
//! Mutable counters used while producing or assembling a stream.
//!
//! Summary: frame counts, token counts and byte counts.
//! Converted into an immutable `TelemetrySnapshot` at the end of a run.
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::progressive::framing::FrameKind;

/// Deterministic counters collected during stream processing
#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryCounters {
    // --- producer ---
    pub frames_root: u64,
    pub frames_resolution: u64,
    pub frames_error: u64,
    pub frames_terminal: u64,
    pub tokens_allocated: u64,
    pub records_resolved: u64,
    pub computations_invoked: u64,
    pub layers_dropped: u64,
    pub bytes_out: u64,

    // --- assembler ---
    pub frames_applied: u64,
    pub tokens_registered: u64,
    pub tokens_resolved: u64,
    pub unknown_tokens: u64,
    pub decode_failures: u64,
    pub bad_paths: u64,
}

impl TelemetryCounters {
    /// Record one frame leaving the scheduler.
    pub fn add_frame(&mut self, kind: FrameKind) {
        match kind {
            FrameKind::Root => self.frames_root += 1,
            FrameKind::Resolution => self.frames_resolution += 1,
            FrameKind::Error => self.frames_error += 1,
            FrameKind::Terminal => self.frames_terminal += 1,
        }
    }

    /// Record encoded bytes handed to the transport.
    pub fn add_bytes_out(&mut self, len: usize) {
        self.bytes_out += len as u64;
    }

    /// Total frames emitted by the producer.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_root + self.frames_resolution + self.frames_error + self.frames_terminal
    }

    pub fn merge(&mut self, other: &TelemetryCounters) {
        *self += other.clone();
    }
}

impl AddAssign for TelemetryCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.frames_root          += rhs.frames_root;
        self.frames_resolution    += rhs.frames_resolution;
        self.frames_error         += rhs.frames_error;
        self.frames_terminal      += rhs.frames_terminal;
        self.tokens_allocated     += rhs.tokens_allocated;
        self.records_resolved     += rhs.records_resolved;
        self.computations_invoked += rhs.computations_invoked;
        self.layers_dropped       += rhs.layers_dropped;
        self.bytes_out            += rhs.bytes_out;

        self.frames_applied       += rhs.frames_applied;
        self.tokens_registered    += rhs.tokens_registered;
        self.tokens_resolved      += rhs.tokens_resolved;
        self.unknown_tokens       += rhs.unknown_tokens;
        self.decode_failures      += rhs.decode_failures;
        self.bad_paths            += rhs.bad_paths;
    }
}
