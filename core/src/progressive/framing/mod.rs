//! Wire framing for progressive streams.
//!
//! Responsibilities:
//! - Define the frame model (root, resolution, error, terminal)
//! - Encode frames into canonical JSON objects
//! - Decode and classify received objects with strict validation
//!
//! Non-responsibilities:
//! - Token allocation
//! - Transport delimiting
//! - Document reconstruction

pub mod types;
pub mod encode;
pub mod decode;

pub use types::{Frame, FrameError, FrameKind};
pub use encode::{encode_frame, encode_frame_bytes};
pub use decode::{decode_frame, decode_frame_str, decode_frame_value};
