//! Stream drivers.
//!
//! `ProgressiveStreamer` pulls one frame at a time out of the layer
//! scheduler. The blocking driver (`Iterator`, `next_frame`) and the
//! awaited driver (`next_frame_async`, `into_stream`) share the same
//! scheduler and failure handling; they differ only in how a computation
//! is invoked.

use std::ops::ControlFlow;
use std::time::Instant;

use bytes::Bytes;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::progressive::framing::{encode_frame_bytes, Frame};
use crate::progressive::layer::{LayerError, LayerScheduler, Outcome, Step};
use crate::progressive::placeholder::Token;
use crate::progressive::value::Record;
use crate::scheduler::FailureMode;
use crate::telemetry::{Stage, TelemetryCounters, TelemetrySnapshot};
use crate::types::StreamError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub failure_mode: FailureMode,
}

impl StreamConfig {
    pub fn new(failure_mode: FailureMode) -> Self {
        Self { failure_mode }
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerStage {
    Encode,
    Compute,
}

/// One layer that produced no resolution frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerFailure {
    /// `None` for the root layer.
    pub token: Option<Token>,
    pub stage: LayerStage,
    pub message: String,
}

impl LayerFailure {
    fn new(token: Option<Token>, error: &LayerError) -> Self {
        let stage = match error {
            LayerError::Encode(_) => LayerStage::Encode,
            LayerError::Compute(_) => LayerStage::Compute,
        };
        Self { token, stage, message: error.to_string() }
    }
}

/// Every failed layer of one stream, in the order they failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamReport {
    pub failures: Vec<LayerFailure>,
}

impl StreamReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.failures.iter().filter_map(|f| f.token)
    }
}

/// Lazy frame producer for one record tree.
pub struct ProgressiveStreamer {
    scheduler: LayerScheduler,
    config: StreamConfig,
    report: StreamReport,
}

impl ProgressiveStreamer {
    pub fn new<R: Record + 'static>(root: R) -> Self {
        Self::from_boxed(Box::new(root))
    }

    pub fn from_boxed(root: Box<dyn Record>) -> Self {
        Self {
            scheduler: LayerScheduler::new(root),
            config: StreamConfig::default(),
            report: StreamReport::default(),
        }
    }

    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Next frame, invoking at most one computation. Async sources are
    /// driven to completion on the calling thread.
    pub fn next_frame(&mut self) -> Option<Result<Frame, StreamError>> {
        loop {
            let outcome = match self.scheduler.step() {
                Step::Ready(outcome) => outcome,
                Step::Compute(item) => {
                    let started = Instant::now();
                    let result = item.source.invoke_blocking();
                    self.scheduler.resolve(item.token, result, started.elapsed())
                }
            };
            if let ControlFlow::Break(item) = self.settle(outcome) {
                return item;
            }
        }
    }

    /// Next frame, awaiting at most one computation.
    pub async fn next_frame_async(&mut self) -> Option<Result<Frame, StreamError>> {
        loop {
            let outcome = match self.scheduler.step() {
                Step::Ready(outcome) => outcome,
                Step::Compute(item) => {
                    let started = Instant::now();
                    let result = item.source.invoke().await;
                    self.scheduler.resolve(item.token, result, started.elapsed())
                }
            };
            if let ControlFlow::Break(item) = self.settle(outcome) {
                return item;
            }
        }
    }

    /// Async driver as a `Stream`. Frames are produced one at a time, on demand.
    pub fn into_stream(self) -> impl Stream<Item = Result<Frame, StreamError>> + Send {
        stream::unfold(self, |mut streamer| async move {
            let item = streamer.next_frame_async().await?;
            Some((item, streamer))
        })
    }

    /// Frames in wire form (no delimiter). Encoded sizes count toward `bytes_out`.
    pub fn encoded(&mut self) -> impl Iterator<Item = Result<Bytes, StreamError>> + '_ {
        std::iter::from_fn(move || {
            let frame = match self.next_frame()? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e)),
            };
            let encoded = self
                .scheduler
                .timer_mut()
                .time(Stage::Encode, || encode_frame_bytes(&frame).map_err(StreamError::from));
            if let Ok(bytes) = &encoded {
                self.record_bytes_out(bytes.len());
            }
            Some(encoded)
        })
    }

    pub fn report(&self) -> &StreamReport {
        &self.report
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn counters(&self) -> &TelemetryCounters {
        self.scheduler.counters()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        TelemetrySnapshot::from(self.scheduler.counters(), self.scheduler.timer())
    }

    pub(crate) fn record_bytes_out(&mut self, len: usize) {
        self.scheduler.counters_mut().add_bytes_out(len);
    }

    pub(crate) fn record_stage(&mut self, stage: Stage, took: std::time::Duration) {
        self.scheduler.timer_mut().add_stage_time(stage, took);
    }

    // ---- failure handling ----

    fn settle(&mut self, outcome: Outcome) -> ControlFlow<Option<Result<Frame, StreamError>>> {
        match outcome {
            Outcome::Emit(frame) => {
                self.scheduler.counters_mut().add_frame(frame.kind());
                if frame.is_terminal() {
                    debug!(frames = self.scheduler.counters().frames_emitted(), "stream completed");
                } else {
                    debug!(kind = ?frame.kind(), token = ?frame.token().map(|t| t.to_string()), "frame emitted");
                }
                ControlFlow::Break(Some(Ok(frame)))
            }
            Outcome::Failed { token, error } => self.on_failure(token, error),
            Outcome::Done => ControlFlow::Break(None),
        }
    }

    fn on_failure(
        &mut self,
        token: Option<Token>,
        error: LayerError,
    ) -> ControlFlow<Option<Result<Frame, StreamError>>> {
        let failure = LayerFailure::new(token, &error);
        warn!(
            token = ?token.map(|t| t.to_string()),
            stage = ?failure.stage,
            mode = ?self.config.failure_mode,
            error = %failure.message,
            "layer dropped"
        );
        self.scheduler.counters_mut().layers_dropped += 1;
        let message = failure.message.clone();
        self.report.failures.push(failure);

        match (self.config.failure_mode, token) {
            (FailureMode::Skip, _) => ControlFlow::Continue(()),
            // The root layer has no token to name; nothing to put in its place.
            (FailureMode::ErrorFrame, None) => ControlFlow::Continue(()),
            (FailureMode::ErrorFrame, Some(token)) => {
                let frame = Frame::Error { token, message };
                self.scheduler.counters_mut().add_frame(frame.kind());
                ControlFlow::Break(Some(Ok(frame)))
            }
            (FailureMode::Abort, _) => {
                self.scheduler.abort();
                ControlFlow::Break(Some(Err(error.into())))
            }
        }
    }
}

impl Iterator for ProgressiveStreamer {
    type Item = Result<Frame, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progressive::value::{ComputeError, Deferred, RecordNode};
    use serde_json::json;

    fn failing_root() -> RecordNode {
        RecordNode::new()
            .field("bad", Deferred::sync(|| Err::<i32, _>(ComputeError::msg("boom"))))
            .field("ok", Deferred::from_fn(|| 1))
    }

    fn wire(streamer: ProgressiveStreamer) -> Vec<serde_json::Value> {
        streamer.map(|f| f.unwrap().to_json()).collect()
    }

    #[test]
    fn skip_drops_the_layer_and_reports_it() {
        let mut s = ProgressiveStreamer::new(failing_root());
        let frames: Vec<_> = s.by_ref().map(|f| f.unwrap().to_json()).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1], json!({"$2": 1, "completed_stream": false}));
        assert_eq!(s.report().failures.len(), 1);
        assert_eq!(s.report().failures[0].stage, LayerStage::Compute);
        assert_eq!(s.report().failed_tokens().collect::<Vec<_>>()[0].to_string(), "$1");
        assert_eq!(s.counters().layers_dropped, 1);
    }

    #[test]
    fn error_frame_replaces_the_resolution() {
        let s = ProgressiveStreamer::new(failing_root())
            .with_config(StreamConfig::new(FailureMode::ErrorFrame));
        let frames = wire(s);
        assert_eq!(
            frames[1],
            json!({"stream_error": {"token": "$1", "message": "boom"}, "completed_stream": false})
        );
        assert_eq!(frames.last(), Some(&json!({"completed_stream": true})));
    }

    #[test]
    fn abort_yields_the_error_and_stops() {
        let mut s = ProgressiveStreamer::new(failing_root())
            .with_config(StreamConfig::new(FailureMode::Abort));
        assert!(s.next().unwrap().is_ok());
        assert!(matches!(s.next(), Some(Err(StreamError::Compute(_)))));
        assert!(s.next().is_none());
        assert!(s.is_finished());
        assert_eq!(s.counters().frames_terminal, 0);
    }

    #[test]
    fn root_failure_still_terminates() {
        struct Broken;
        impl Record for Broken {
            fn field_names(&self) -> Vec<String> {
                vec!["ghost".into()]
            }
            fn take(&mut self, _: &str) -> Option<crate::progressive::value::Node> {
                None
            }
        }
        let mut s = ProgressiveStreamer::new(Broken);
        let frames: Vec<_> = s.by_ref().map(|f| f.unwrap()).collect();
        assert_eq!(frames, vec![Frame::Terminal]);
        assert_eq!(s.report().failures[0].token, None);
        assert_eq!(s.report().failures[0].stage, LayerStage::Encode);
    }

    #[test]
    fn config_deserializes_from_json() {
        let c: StreamConfig = serde_json::from_str(r#"{"failure_mode":"error_frame"}"#).unwrap();
        assert_eq!(c.failure_mode, FailureMode::ErrorFrame);
        let d: StreamConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(d, StreamConfig::default());
    }
}
