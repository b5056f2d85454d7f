//! scheduler/policy.rs
//! Failure policies: what the producer does with a failed layer, and how
//! long the consumer keeps skipping undecodable payloads.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MAX_CONSECUTIVE_FAILURES;
use crate::types::StreamError;

/// Producer-side handling of a layer that failed to encode or compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Drop the layer, emit nothing for it, keep streaming.
    #[default]
    Skip,
    /// Emit an error frame naming the token in place of the resolution frame.
    ErrorFrame,
    /// Yield the error and stop; no terminal frame follows.
    Abort,
}

/// Consumer-side ceiling on consecutive undecodable payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodePolicy {
    pub max_consecutive_failures: usize,
}

impl Default for DecodePolicy {
    fn default() -> Self {
        Self { max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES }
    }
}

impl DecodePolicy {
    pub fn new(max_consecutive_failures: usize) -> Self {
        Self { max_consecutive_failures }
    }

    pub fn should_abort(&self, consecutive: usize) -> bool {
        consecutive >= self.max_consecutive_failures
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.max_consecutive_failures == 0 {
            return Err(StreamError::Validation(
                "max_consecutive_failures must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Running failure count checked against a `DecodePolicy`.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    policy: DecodePolicy,
    consecutive: usize,
    total: usize,
}

impl FailureTracker {
    pub fn new(policy: DecodePolicy) -> Self {
        Self { policy, consecutive: 0, total: 0 }
    }

    /// A payload decoded; the streak is broken.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// A payload failed to decode. Errors once the ceiling is reached.
    pub fn record_failure(&mut self) -> Result<(), StreamError> {
        self.consecutive += 1;
        self.total += 1;
        if self.policy.should_abort(self.consecutive) {
            return Err(StreamError::DecodeCeiling { failures: self.consecutive });
        }
        Ok(())
    }

    pub fn consecutive(&self) -> usize {
        self.consecutive
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
