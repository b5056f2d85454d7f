use std::io;

use thiserror::Error;

use crate::progressive::{
    assembler::AssembleError,
    encoder::EncodeError,
    framing::FrameError,
    value::ComputeError,
};

/// Unified stream error covering transport, framing, encoding, computation and assembly.
/// - `From<T>` impls enable `?` across the pipeline.
/// - Only `Io` (transport) is always fatal; the rest are fatal only
///   where a driver or policy decides so.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Transport I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Frame-level error (encode or decode).
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Record introspection / field encoding error.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// A deferred computation failed.
    #[error("compute error: {0}")]
    Compute(#[from] ComputeError),

    /// Assembler protocol error.
    #[error("assemble error: {0}")]
    Assemble(#[from] AssembleError),

    /// A delimited payload longer than the configured maximum.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLong { len: usize, max: usize },

    /// Too many undecodable payloads in a row.
    #[error("gave up after {failures} consecutive undecodable frames")]
    DecodeCeiling { failures: usize },

    /// The source ended before the terminal frame.
    #[error("stream ended before the terminal frame")]
    Incomplete,

    /// Pipeline wiring error (channel closed, worker gone).
    #[error("pipeline error: {0}")]
    Pipeline(&'static str),

    /// Generic high-level validation with a descriptive message.
    #[error("validation error: {0}")]
    Validation(String),
}

impl StreamError {
    /// Payload-level problems the assembler may skip: the payload was
    /// delimited but cannot become a frame.
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            StreamError::Frame(_) | StreamError::FrameTooLong { .. }
        )
    }
}
