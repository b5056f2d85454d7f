//! Consumer side of the protocol.
//!
//! Responsibilities:
//! - Maintain the working document and the token → path map
//! - Apply frames strictly in arrival order
//! - Skip undecodable payloads up to the decode ceiling
//!
//! Non-responsibilities:
//! - Transport delimiting (see `io`)
//! - Reordering or deduplicating frames

pub mod path;
#[allow(clippy::module_inception)]
pub mod assembler;

pub use path::{collect_tokens, insert_at, DocPath, PathMiss, PathSegment};
pub use assembler::{
    assemble, assemble_async, assemble_frames, assemble_frames_async, assemble_str,
    AssembleConfig, AssembleError, Assembler, Progress,
};
