use bytes::Bytes;

use crate::progressive::framing::types::{Frame, FrameError};

/// Encode a frame into its canonical wire form: one compact JSON object,
/// keys in emission order, completion marker last. No delimiter.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, FrameError> {
    Ok(serde_json::to_vec(&frame.to_json())?)
}

/// `encode_frame` into shared bytes.
pub fn encode_frame_bytes(frame: &Frame) -> Result<Bytes, FrameError> {
    encode_frame(frame).map(Bytes::from)
}
