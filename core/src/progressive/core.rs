// ## core.rs: stable public API

use serde::{Deserialize, Serialize};

use crate::progressive::{
    assembler::AssembleConfig,
    io::{open_input, open_output, take_buffer, InputSource, OutputSink},
    pipeline::{run_assemble_pipeline, run_stream_pipeline, AssembleOutcome, StreamOutcome},
    streamer::{ProgressiveStreamer, StreamConfig},
    value::Record,
};
use crate::types::StreamError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub stream: StreamConfig,
    pub assemble: AssembleConfig,

    /// Capture in-memory sink output so it comes back in `StreamOutcome::output`.
    /// Off by default; tests turn it on.
    pub with_buf: bool,
}

impl ApiConfig {
    pub fn new(stream: StreamConfig, assemble: AssembleConfig) -> Self {
        Self { stream, assemble, with_buf: false }
    }

    pub fn with_buf_enabled() -> Self {
        Self { with_buf: true, ..Self::default() }
    }

    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_assemble(mut self, assemble: AssembleConfig) -> Self {
        self.assemble = assemble;
        self
    }
}

/// Stream `root` into `output`, one frame per line.
pub fn stream_to_sink<R: Record + 'static>(
    root: R,
    output: OutputSink,
    config: &ApiConfig,
) -> Result<StreamOutcome, StreamError> {
    validate_config(config)?;

    let (writer, maybe_buf) = open_output(output, config.with_buf)?;
    let streamer = ProgressiveStreamer::new(root).with_config(config.stream);
    let mut outcome = run_stream_pipeline(streamer, writer)?;

    if let Some(buf) = maybe_buf {
        outcome.output = Some(take_buffer(&buf)?);
    }
    Ok(outcome)
}

/// Read newline-delimited frames from `input` and rebuild the document.
pub fn assemble_from_source(input: InputSource, config: &ApiConfig) -> Result<AssembleOutcome, StreamError> {
    validate_config(config)?;
    let reader = open_input(input)?;
    run_assemble_pipeline(reader, config.assemble)
}

pub fn validate_config(config: &ApiConfig) -> Result<(), StreamError> {
    config.assemble.validate()
}
