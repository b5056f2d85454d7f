use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::{
    COMPLETED_STREAM_KEY, ERROR_MESSAGE_KEY, ERROR_TOKEN_KEY, STREAM_ERROR_KEY,
};
use crate::progressive::placeholder::Token;

/// One unit of the producer's output.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Field-keyed frame. The producer emits exactly one, first: the root
    /// record's fields with nested/deferred values replaced by tokens.
    Root(Map<String, Value>),
    /// `{ token: payload }` for a previously announced token.
    Resolution { token: Token, payload: Value },
    /// The layer behind `token` failed; the slot stays unresolved.
    Error { token: Token, message: String },
    /// `{ "completed_stream": true }`, exactly once, last.
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Root,
    Resolution,
    Error,
    Terminal,
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Root(_) => FrameKind::Root,
            Frame::Resolution { .. } => FrameKind::Resolution,
            Frame::Error { .. } => FrameKind::Error,
            Frame::Terminal => FrameKind::Terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Terminal)
    }

    /// Token this frame resolves (or reports failed), if any.
    pub fn token(&self) -> Option<Token> {
        match self {
            Frame::Resolution { token, .. } | Frame::Error { token, .. } => Some(*token),
            Frame::Root(_) | Frame::Terminal => None,
        }
    }

    /// Wire object, completion marker last.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        match self {
            Frame::Root(fields) => {
                for (k, v) in fields {
                    out.insert(k.clone(), v.clone());
                }
            }
            Frame::Resolution { token, payload } => {
                out.insert(token.to_string(), payload.clone());
            }
            Frame::Error { token, message } => {
                let mut body = Map::new();
                body.insert(ERROR_TOKEN_KEY.into(), Value::from(*token));
                body.insert(ERROR_MESSAGE_KEY.into(), Value::String(message.clone()));
                out.insert(STREAM_ERROR_KEY.into(), Value::Object(body));
            }
            Frame::Terminal => {}
        }
        out.insert(COMPLETED_STREAM_KEY.into(), Value::Bool(self.is_terminal()));
        Value::Object(out)
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object frame, got {0}")]
    NotAnObject(&'static str),

    #[error("completion marker must be a boolean, got {0}")]
    BadCompletionMarker(&'static str),

    #[error("terminal frame carries extra keys: {0:?}")]
    TerminalWithPayload(Vec<String>),
}
