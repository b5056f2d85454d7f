//! Progressive structured-value streaming.
//!
//! Producer: `ProgressiveStreamer` turns a record tree into a root frame,
//! resolution frames in breadth-first layer order, and one terminal frame.
//! Consumer: `Assembler` folds that frame sequence back into the single
//! document `dump` would have produced.

pub mod value;
pub mod placeholder;
pub mod encoder;
pub mod layer;
pub mod streamer;
pub mod framing;
pub mod assembler;
pub mod dump;
pub mod io;
pub mod pipeline;
pub mod core;

pub use value::{ComputeError, ComputeResult, Deferred, Node, NodeKind, Record, RecordNode};
pub use placeholder::{PlaceholderContext, Token};
pub use encoder::{EncodeError, FieldEncoder};
pub use layer::LayerError;
pub use streamer::{LayerFailure, LayerStage, ProgressiveStreamer, StreamConfig, StreamReport};
pub use framing::{decode_frame, encode_frame, Frame, FrameError, FrameKind};
pub use assembler::{
    assemble, assemble_async, assemble_frames, assemble_frames_async, assemble_str,
    AssembleConfig, AssembleError, Assembler,
};
pub use dump::{dump, dump_async, dump_record};
pub use io::{FrameLineCodec, FrameLines, FrameWriter, InputSource, OutputSink};
pub use pipeline::{
    run_assemble_pipeline, run_assemble_pipeline_async, run_stream_pipeline,
    run_stream_pipeline_async, AssembleOutcome, StreamOutcome,
};
pub use self::core::{assemble_from_source, stream_to_sink, validate_config, ApiConfig};
