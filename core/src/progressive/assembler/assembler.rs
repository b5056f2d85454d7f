//! Assembler: rebuilds the single document a frame sequence describes.
//!
//! Every value written into the document (root fields and resolution
//! payloads) is scanned for token strings; each one is registered with the
//! path where it sits, so placeholders nested at any depth, including
//! inside collections of a resolved payload, are filled in when their
//! resolution frame arrives.
//!
//! A string that looks like a token (`$<n>`) is treated as a placeholder
//! wherever it appears. User data that happens to have that shape is
//! indistinguishable on the wire.

use std::collections::HashMap;
use std::time::Instant;

use futures::{pin_mut, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::constants::DEFAULT_MAX_FRAME_LEN;
use crate::progressive::assembler::path::{collect_tokens, insert_at, DocPath};
use crate::progressive::framing::{decode_frame, Frame};
use crate::progressive::placeholder::Token;
use crate::scheduler::{DecodePolicy, FailureTracker};
use crate::telemetry::{Stage, TelemetryCounters, TelemetrySnapshot, TelemetryTimer};
use crate::types::StreamError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    /// Resolution for a token that was never announced (or already resolved).
    #[error("unknown token {0}")]
    UnknownToken(Token),

    /// The recorded slot for a token no longer exists in the document.
    #[error("no slot at {path} for token {token}")]
    BadPath { token: Token, path: String },

    /// The producer reported that the layer behind a token failed.
    #[error("producer failed to resolve {token}: {message}")]
    Unresolvable { token: Token, message: String },

    #[error("frame received after the terminal frame")]
    AfterCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssembleConfig {
    pub policy: DecodePolicy,
    /// Longest accepted frame payload, in bytes.
    pub max_frame_len: usize,
}

impl Default for AssembleConfig {
    fn default() -> Self {
        Self { policy: DecodePolicy::default(), max_frame_len: DEFAULT_MAX_FRAME_LEN }
    }
}

impl AssembleConfig {
    pub fn with_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        self.policy.validate()?;
        if self.max_frame_len == 0 {
            return Err(StreamError::Validation("max_frame_len must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    Completed,
}

impl Progress {
    pub fn is_completed(self) -> bool {
        self == Progress::Completed
    }
}

pub struct Assembler {
    config: AssembleConfig,
    document: Map<String, Value>,
    pending: HashMap<Token, DocPath>,
    completed: bool,
    issues: Vec<AssembleError>,
    counters: TelemetryCounters,
    timer: TelemetryTimer,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(AssembleConfig::default())
    }
}

impl Assembler {
    pub fn new(config: AssembleConfig) -> Self {
        Self {
            config,
            document: Map::new(),
            pending: HashMap::new(),
            completed: false,
            issues: Vec::new(),
            counters: TelemetryCounters::default(),
            timer: TelemetryTimer::new(),
        }
    }

    /// Apply one decoded frame, strictly in arrival order.
    ///
    /// Protocol violations inside a frame (unknown token, vanished slot) are
    /// logged, kept in `issues`, and skipped. Only a frame after the terminal
    /// frame is an error.
    pub fn apply(&mut self, frame: Frame) -> Result<Progress, AssembleError> {
        if self.completed {
            return Err(AssembleError::AfterCompletion);
        }
        let started = Instant::now();
        self.counters.frames_applied += 1;

        let progress = match frame {
            Frame::Root(fields) => {
                for (key, value) in fields {
                    match Token::parse(&key) {
                        Some(token) => self.resolve(token, value),
                        None => self.write_field(key, value),
                    }
                }
                Progress::Continue
            }
            Frame::Resolution { token, payload } => {
                self.resolve(token, payload);
                Progress::Continue
            }
            Frame::Error { token, message } => {
                warn!(%token, %message, "producer reported a failed layer");
                self.pending.remove(&token);
                self.issues.push(AssembleError::Unresolvable { token, message });
                Progress::Continue
            }
            Frame::Terminal => {
                self.completed = true;
                self.timer.finish();
                debug!(
                    frames = self.counters.frames_applied,
                    unresolved = self.pending.len(),
                    "assembly completed"
                );
                Progress::Completed
            }
        };

        self.timer.add_stage_time(Stage::Assemble, started.elapsed());
        Ok(progress)
    }

    /// Decode and apply one payload. Decode failures surface as errors here;
    /// the `consume*` drivers apply the skip-with-ceiling policy.
    pub fn apply_bytes(&mut self, payload: &[u8]) -> Result<Progress, StreamError> {
        let frame = self.decode(payload)?;
        Ok(self.apply(frame)?)
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Tokens announced but not resolved yet.
    pub fn pending_tokens(&self) -> Vec<Token> {
        let mut tokens: Vec<Token> = self.pending.keys().copied().collect();
        tokens.sort();
        tokens
    }

    pub fn issues(&self) -> &[AssembleError] {
        &self.issues
    }

    pub fn counters(&self) -> &TelemetryCounters {
        &self.counters
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        TelemetrySnapshot::from(&self.counters, &self.timer)
    }

    pub(crate) fn record_stage(&mut self, stage: Stage, took: std::time::Duration) {
        self.timer.add_stage_time(stage, took);
    }

    pub fn into_document(self) -> Value {
        Value::Object(self.document)
    }

    // ---- drivers ----

    /// Drain a payload source until the terminal frame.
    ///
    /// Transport errors are fatal. Undecodable or oversized payloads are
    /// skipped until `max_consecutive_failures` of them arrive in a row.
    /// Blank payloads are ignored.
    pub fn consume<I, B, E>(&mut self, source: I) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        StreamError: From<E>,
    {
        let mut tracker = FailureTracker::new(self.config.policy);
        for item in source {
            if self.feed(item.map_err(StreamError::from), &mut tracker)?.is_completed() {
                return Ok(());
            }
        }
        Err(StreamError::Incomplete)
    }

    /// `consume` over an async payload source.
    pub async fn consume_async<S, B, E>(&mut self, source: S) -> Result<(), StreamError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        StreamError: From<E>,
    {
        pin_mut!(source);
        let mut tracker = FailureTracker::new(self.config.policy);
        while let Some(item) = source.next().await {
            if self.feed(item.map_err(StreamError::from), &mut tracker)?.is_completed() {
                return Ok(());
            }
        }
        Err(StreamError::Incomplete)
    }

    /// Apply already-decoded frames, e.g. straight from a `ProgressiveStreamer`.
    pub fn consume_frames<I>(&mut self, frames: I) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = Result<Frame, StreamError>>,
    {
        for frame in frames {
            if self.apply(frame?)?.is_completed() {
                return Ok(());
            }
        }
        Err(StreamError::Incomplete)
    }

    pub async fn consume_frames_async<S>(&mut self, frames: S) -> Result<(), StreamError>
    where
        S: Stream<Item = Result<Frame, StreamError>>,
    {
        pin_mut!(frames);
        while let Some(frame) = frames.next().await {
            if self.apply(frame?)?.is_completed() {
                return Ok(());
            }
        }
        Err(StreamError::Incomplete)
    }

    // ---- internals ----

    fn feed<B: AsRef<[u8]>>(
        &mut self,
        item: Result<B, StreamError>,
        tracker: &mut FailureTracker,
    ) -> Result<Progress, StreamError> {
        let decoded = item.and_then(|payload| {
            let payload = payload.as_ref();
            if payload.iter().all(u8::is_ascii_whitespace) {
                return Ok(None);
            }
            self.decode(payload).map(Some)
        });

        match decoded {
            Ok(None) => Ok(Progress::Continue),
            Ok(Some(frame)) => {
                tracker.record_success();
                Ok(self.apply(frame)?)
            }
            Err(e) if e.is_payload_error() => {
                self.counters.decode_failures += 1;
                warn!(error = %e, consecutive = tracker.consecutive() + 1, "undecodable frame skipped");
                tracker.record_failure()?;
                Ok(Progress::Continue)
            }
            Err(e) => Err(e),
        }
    }

    fn decode(&mut self, payload: &[u8]) -> Result<Frame, StreamError> {
        if payload.len() > self.config.max_frame_len {
            return Err(StreamError::FrameTooLong {
                len: payload.len(),
                max: self.config.max_frame_len,
            });
        }
        let started = Instant::now();
        let frame = decode_frame(payload);
        self.timer.add_stage_time(Stage::Decode, started.elapsed());
        Ok(frame?)
    }

    /// Plain key: a root field, written as-is (placeholders stay visible
    /// until resolved).
    fn write_field(&mut self, key: String, value: Value) {
        let path = DocPath::root().key(key.as_str());
        self.register(&value, &path);
        self.document.insert(key, value);
    }

    fn resolve(&mut self, token: Token, value: Value) {
        let Some(path) = self.pending.remove(&token) else {
            warn!(%token, "resolution for unknown token skipped");
            self.counters.unknown_tokens += 1;
            self.issues.push(AssembleError::UnknownToken(token));
            return;
        };

        let mut found = Vec::new();
        collect_tokens(&value, &path, &mut found);

        if insert_at(&mut self.document, &path, value).is_err() {
            error!(%token, %path, "placeholder slot missing");
            self.counters.bad_paths += 1;
            self.issues.push(AssembleError::BadPath { token, path: path.to_string() });
            return;
        }

        self.counters.tokens_resolved += 1;
        for (inner, inner_path) in found {
            self.track(inner, inner_path);
        }
    }

    fn register(&mut self, value: &Value, base: &DocPath) {
        let mut found = Vec::new();
        collect_tokens(value, base, &mut found);
        for (token, path) in found {
            self.track(token, path);
        }
    }

    /// A token announced again moves to its latest slot.
    fn track(&mut self, token: Token, path: DocPath) {
        match self.pending.insert(token, path) {
            Some(previous) => {
                warn!(%token, previous = %previous, "token announced again; latest slot wins");
            }
            None => self.counters.tokens_registered += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// One-shot helpers
// ---------------------------------------------------------------------------

/// Assemble a payload sequence into the final document.
pub fn assemble<I, B, E>(source: I, config: AssembleConfig) -> Result<Value, StreamError>
where
    I: IntoIterator<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    StreamError: From<E>,
{
    let mut assembler = Assembler::new(config);
    assembler.consume(source)?;
    Ok(assembler.into_document())
}

pub async fn assemble_async<S, B, E>(source: S, config: AssembleConfig) -> Result<Value, StreamError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    StreamError: From<E>,
{
    let mut assembler = Assembler::new(config);
    assembler.consume_async(source).await?;
    Ok(assembler.into_document())
}

/// Assemble newline-delimited frames held in memory.
pub fn assemble_str(text: &str) -> Result<Value, StreamError> {
    assemble(text.lines().map(Ok::<_, StreamError>), AssembleConfig::default())
}

pub fn assemble_frames<I>(frames: I) -> Result<Value, StreamError>
where
    I: IntoIterator<Item = Result<Frame, StreamError>>,
{
    let mut assembler = Assembler::default();
    assembler.consume_frames(frames)?;
    Ok(assembler.into_document())
}

pub async fn assemble_frames_async<S>(frames: S) -> Result<Value, StreamError>
where
    S: Stream<Item = Result<Frame, StreamError>>,
{
    let mut assembler = Assembler::default();
    assembler.consume_frames_async(frames).await?;
    Ok(assembler.into_document())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progressive::framing::decode_frame_value;
    use serde_json::json;

    fn frame(v: Value) -> Frame {
        decode_frame_value(v).unwrap()
    }

    #[test]
    fn nested_placeholders_inside_payloads_resolve() {
        let mut a = Assembler::default();
        a.apply(frame(json!({"name": "n", "address": "$1", "completed_stream": false}))).unwrap();
        a.apply(frame(json!({"$1": {"city": "c", "geo": "$2", "tags": ["t", "$3"]}, "completed_stream": false}))).unwrap();
        assert_eq!(a.pending_tokens().len(), 2);
        a.apply(frame(json!({"$3": {"k": 1}, "completed_stream": false}))).unwrap();
        a.apply(frame(json!({"$2": [1.5, 2.5], "completed_stream": false}))).unwrap();
        assert!(a.apply(frame(json!({"completed_stream": true}))).unwrap().is_completed());
        assert_eq!(
            a.into_document(),
            json!({"name": "n", "address": {"city": "c", "geo": [1.5, 2.5], "tags": ["t", {"k": 1}]}})
        );
    }

    #[test]
    fn unknown_token_is_skipped_and_recorded() {
        let mut a = Assembler::default();
        a.apply(frame(json!({"x": 1, "completed_stream": false}))).unwrap();
        a.apply(frame(json!({"$9": 2, "completed_stream": false}))).unwrap();
        assert_eq!(a.issues(), [AssembleError::UnknownToken(Token::new(9).unwrap())]);
        assert_eq!(a.counters().unknown_tokens, 1);
        assert_eq!(a.document().get("x"), Some(&json!(1)));
    }

    #[test]
    fn frames_after_completion_are_rejected() {
        let mut a = Assembler::default();
        a.apply(Frame::Terminal).unwrap();
        assert_eq!(a.apply(Frame::Terminal), Err(AssembleError::AfterCompletion));
    }

    #[test]
    fn error_frame_leaves_placeholder_in_place() {
        let mut a = Assembler::default();
        a.apply(frame(json!({"s": "$1", "completed_stream": false}))).unwrap();
        a.apply(Frame::Error { token: Token::new(1).unwrap(), message: "boom".into() }).unwrap();
        a.apply(Frame::Terminal).unwrap();
        assert!(a.pending_tokens().is_empty());
        assert!(matches!(a.issues(), [AssembleError::Unresolvable { message, .. }] if message == "boom"));
        assert_eq!(a.into_document(), json!({"s": "$1"}));
    }

    #[test]
    fn consume_skips_garbage_and_blank_lines() {
        let text = "{\"a\":\"$1\",\"completed_stream\":false}\n\nnot json\n{\"$1\":5,\"completed_stream\":false}\n{\"completed_stream\":true}\n";
        assert_eq!(assemble_str(text).unwrap(), json!({"a": 5}));
    }

    #[test]
    fn oversized_payload_counts_as_decode_failure() {
        let config = AssembleConfig::default()
            .with_policy(DecodePolicy::new(1))
            .with_max_frame_len(8);
        let source = ["{\"completed_stream\":true}"].map(Ok::<_, StreamError>);
        assert!(matches!(assemble(source, config), Err(StreamError::DecodeCeiling { failures: 1 })));
    }
}
