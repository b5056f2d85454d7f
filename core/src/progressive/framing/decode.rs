use serde_json::{Map, Value};

use crate::constants::{COMPLETED_STREAM_KEY, ERROR_MESSAGE_KEY, ERROR_TOKEN_KEY, STREAM_ERROR_KEY};
use crate::progressive::framing::types::{Frame, FrameError};
use crate::progressive::placeholder::Token;
use crate::utils::json_kind;

/// Decode a single frame from bytes.
///
/// Caller guarantees:
/// - One complete frame, delimiter already stripped
/// - Ordering is handled externally
pub fn decode_frame(wire: &[u8]) -> Result<Frame, FrameError> {
    let value: Value = serde_json::from_slice(wire)?;
    decode_frame_value(value)
}

pub fn decode_frame_str(wire: &str) -> Result<Frame, FrameError> {
    decode_frame(wire.as_bytes())
}

/// Classify an already-parsed wire object.
///
/// - missing completion marker reads as `false`
/// - `{token: v}` with a single canonical token key is a resolution
/// - `{"stream_error": {"token": "$n", "message": ".."}}` is an error frame
/// - anything else is a field-keyed (root) frame, including a lone
///   `stream_error` field whose value is not a well-formed error body
pub fn decode_frame_value(value: Value) -> Result<Frame, FrameError> {
    let mut map = match value {
        Value::Object(map) => map,
        other => return Err(FrameError::NotAnObject(json_kind(&other))),
    };

    let completed = match map.shift_remove(COMPLETED_STREAM_KEY) {
        None => false,
        Some(Value::Bool(b)) => b,
        Some(other) => return Err(FrameError::BadCompletionMarker(json_kind(&other))),
    };

    if completed {
        if !map.is_empty() {
            return Err(FrameError::TerminalWithPayload(map.keys().cloned().collect()));
        }
        return Ok(Frame::Terminal);
    }

    if map.len() == 1 {
        if let Some(frame) = single_key_frame(&mut map) {
            return Ok(frame);
        }
    }

    Ok(Frame::Root(map))
}

fn single_key_frame(map: &mut Map<String, Value>) -> Option<Frame> {
    let key = map.keys().next().cloned()?;

    if let Some(token) = Token::parse(&key) {
        let payload = map.shift_remove(&key).unwrap_or(Value::Null);
        return Some(Frame::Resolution { token, payload });
    }

    if key == STREAM_ERROR_KEY {
        return map.get(STREAM_ERROR_KEY).and_then(parse_error_body);
    }

    None
}

fn parse_error_body(body: &Value) -> Option<Frame> {
    let body = body.as_object()?;
    if body.len() != 2 {
        return None;
    }
    let token = body.get(ERROR_TOKEN_KEY).and_then(Value::as_str).and_then(Token::parse)?;
    let message = body.get(ERROR_MESSAGE_KEY).and_then(Value::as_str)?.to_owned();
    Some(Frame::Error { token, message })
}
