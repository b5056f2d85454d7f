//! Layer Scheduler.
//!
//! Responsibilities:
//! - Own the placeholder context and the two pending queues for one stream
//! - Decide what the next frame is: root, then records, then computations,
//!   then the terminal frame
//! - Re-encode computation results through the Field Encoder
//!
//! Non-responsibilities:
//! - Invoking computations (the driver does that, blocking or awaited)
//! - Failure policy (the driver applies `FailureMode`)

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::constants::COMPLETED_STREAM_KEY;
use crate::progressive::encoder::{ComputationItem, Discovered, EncodeError, FieldEncoder, RecordItem};
use crate::progressive::framing::{decode_frame_value, Frame, FrameKind};
use crate::progressive::placeholder::{PlaceholderContext, Token};
use crate::progressive::value::{ComputeError, ComputeResult, Node, Record};
use crate::telemetry::{Stage, TelemetryCounters, TelemetryTimer};
use crate::types::StreamError;

/// Why a single layer produced no resolution.
#[derive(Debug, Error)]
pub enum LayerError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}

impl From<LayerError> for StreamError {
    fn from(e: LayerError) -> Self {
        match e {
            LayerError::Encode(e) => StreamError::Encode(e),
            LayerError::Compute(e) => StreamError::Compute(e),
        }
    }
}

/// Result of one scheduler pull once no computation is outstanding.
#[derive(Debug)]
pub(crate) enum Outcome {
    Emit(Frame),
    /// `token` is `None` when the root layer failed.
    Failed { token: Option<Token>, error: LayerError },
    Done,
}

/// What the driver must do next.
pub(crate) enum Step {
    Ready(Outcome),
    /// Invoke the source, then hand the result to `LayerScheduler::resolve`.
    Compute(ComputationItem),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Root,
    Layers,
    Finished,
}

pub(crate) struct LayerScheduler {
    context: PlaceholderContext,
    root: Option<Box<dyn Record>>,
    records: VecDeque<RecordItem>,
    computations: VecDeque<ComputationItem>,
    state: State,
    counters: TelemetryCounters,
    timer: TelemetryTimer,
}

impl LayerScheduler {
    pub fn new(root: Box<dyn Record>) -> Self {
        Self {
            context: PlaceholderContext::new(),
            root: Some(root),
            records: VecDeque::new(),
            computations: VecDeque::new(),
            state: State::Root,
            counters: TelemetryCounters::default(),
            timer: TelemetryTimer::new(),
        }
    }

    /// Advance by one layer.
    pub fn step(&mut self) -> Step {
        match self.state {
            State::Finished => Step::Ready(Outcome::Done),
            State::Root => {
                self.state = State::Layers;
                let Some(mut root) = self.root.take() else {
                    return self.step();
                };
                Step::Ready(match self.encode_root(root.as_mut()) {
                    Ok(fields) => Outcome::Emit(Frame::Root(fields)),
                    Err(error) => Outcome::Failed { token: None, error: error.into() },
                })
            }
            State::Layers => {
                if let Some(RecordItem { token, mut record }) = self.records.pop_front() {
                    return Step::Ready(match self.encode_layer(record.as_mut()) {
                        Ok(fields) => {
                            self.counters.records_resolved += 1;
                            Outcome::Emit(Frame::Resolution { token, payload: Value::Object(fields) })
                        }
                        Err(error) => Outcome::Failed { token: Some(token), error: error.into() },
                    });
                }

                if let Some(item) = self.computations.pop_front() {
                    debug!(token = %item.token, is_async = item.source.is_async(), "invoking computation");
                    return Step::Compute(item);
                }

                self.finish();
                Step::Ready(Outcome::Emit(Frame::Terminal))
            }
        }
    }

    /// Encode the value a computation produced for `token`.
    ///
    /// A record result resolves to the flat mapping of its fields, exactly
    /// like a record item. Anything else goes through the field rule, so a
    /// deferred result gets a fresh token.
    pub fn resolve(&mut self, token: Token, result: ComputeResult, took: Duration) -> Outcome {
        self.counters.computations_invoked += 1;
        self.timer.add_stage_time(Stage::Compute, took);

        let node = match result {
            Ok(node) => node,
            Err(error) => return Outcome::Failed { token: Some(token), error: error.into() },
        };

        let payload = match node {
            Node::Record(mut record) => self.encode_layer(record.as_mut()).map(Value::Object),
            other => self.encode_value(token, other),
        };

        match payload {
            Ok(payload) => Outcome::Emit(Frame::Resolution { token, payload }),
            Err(error) => Outcome::Failed { token: Some(token), error: error.into() },
        }
    }

    /// Stop producing. Later pulls yield `Outcome::Done`.
    pub fn abort(&mut self) {
        self.records.clear();
        self.computations.clear();
        self.finish();
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    pub fn counters(&self) -> &TelemetryCounters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut TelemetryCounters {
        &mut self.counters
    }

    pub fn timer(&self) -> &TelemetryTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut TelemetryTimer {
        &mut self.timer
    }

    // ---- internals ----

    fn finish(&mut self) {
        if self.state != State::Finished {
            self.state = State::Finished;
            self.timer.finish();
        }
    }

    fn encode_root(&mut self, root: &mut dyn Record) -> Result<Map<String, Value>, EncodeError> {
        self.encode_fields(root, check_root_shape)
    }

    fn encode_layer(&mut self, record: &mut dyn Record) -> Result<Map<String, Value>, EncodeError> {
        self.encode_fields(record, |_| Ok(()))
    }

    fn encode_fields(
        &mut self,
        record: &mut dyn Record,
        check: impl FnOnce(&Map<String, Value>) -> Result<(), EncodeError>,
    ) -> Result<Map<String, Value>, EncodeError> {
        let checkpoint = self.context.checkpoint();
        let started = Instant::now();
        let mut encoder = FieldEncoder::new(&mut self.context);
        let fields = encoder.encode_record(record).and_then(|fields| {
            check(&fields)?;
            Ok(fields)
        });
        let discovered = encoder.finish();
        self.timer.add_stage_time(Stage::Encode, started.elapsed());

        match fields {
            Ok(fields) => {
                self.enqueue(discovered);
                Ok(fields)
            }
            Err(e) => {
                self.context.rewind(checkpoint);
                Err(e)
            }
        }
    }

    fn encode_value(&mut self, token: Token, node: Node) -> Result<Value, EncodeError> {
        let checkpoint = self.context.checkpoint();
        let started = Instant::now();
        let mut encoder = FieldEncoder::new(&mut self.context);
        let value = encoder.encode_field(&token.to_string(), node);
        let discovered = encoder.finish();
        self.timer.add_stage_time(Stage::Encode, started.elapsed());

        match value {
            Ok(value) => {
                self.enqueue(discovered);
                Ok(value)
            }
            Err(e) => {
                self.context.rewind(checkpoint);
                Err(e)
            }
        }
    }

    /// Items from a failed layer are never enqueued and their tokens are
    /// handed out again, so announced tokens stay gap-free.
    fn enqueue(&mut self, discovered: Discovered) {
        self.records.extend(discovered.records);
        self.computations.extend(discovered.computations);
        self.counters.tokens_allocated = self.context.allocated();
    }
}

/// Root fields must read back as root fields: no completion-marker key,
/// and a lone field must not turn the frame into another frame kind.
fn check_root_shape(fields: &Map<String, Value>) -> Result<(), EncodeError> {
    if fields.contains_key(COMPLETED_STREAM_KEY) {
        return Err(EncodeError::ReservedRootShape { field: COMPLETED_STREAM_KEY.to_owned() });
    }
    if fields.len() != 1 {
        return Ok(());
    }
    match decode_frame_value(Value::Object(fields.clone())) {
        Ok(frame) if frame.kind() == FrameKind::Root => Ok(()),
        _ => Err(EncodeError::ReservedRootShape {
            field: fields.keys().next().cloned().unwrap_or_default(),
        }),
    }
}
