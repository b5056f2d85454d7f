//! progressive-core
//!
//! Progressive JSON streaming: cheap fields first, nested records and
//! deferred computations in later frames, reassembled on the other side.
//! Pure Rust, no FFI.

#![forbid(unsafe_code)]

// Shared and top level
pub mod constants;
pub mod types;
pub mod utils;

pub mod telemetry;
pub mod scheduler;

// Protocol
pub mod progressive;

// -----------------------------------------------------------------------------
// Prelude (Rust users)
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::progressive::{
        assemble, assemble_async, assemble_frames, assemble_frames_async, assemble_str, dump,
        dump_async, stream_to_sink, assemble_from_source, ApiConfig, AssembleConfig, Assembler,
        ComputeError, Deferred, Frame, InputSource, Node, OutputSink, ProgressiveStreamer, Record,
        RecordNode, StreamConfig, Token,
    };
    pub use crate::scheduler::{DecodePolicy, FailureMode};
    pub use crate::types::StreamError;
}
