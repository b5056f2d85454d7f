//! constants.rs
//! Wire keys and policy defaults shared by the producer and the assembler.

/// Completion marker carried by every frame.
/// `false` on root/resolution/error frames, `true` only on the terminal frame.
pub const COMPLETED_STREAM_KEY: &str = "completed_stream";

/// Key of an error frame (emitted only with `FailureMode::ErrorFrame`).
pub const STREAM_ERROR_KEY: &str = "stream_error";

/// Fields of the error frame body.
pub const ERROR_TOKEN_KEY: &str = "token";
pub const ERROR_MESSAGE_KEY: &str = "message";

/// Placeholder tokens are `$<n>` with `n >= 1`.
pub const TOKEN_PREFIX: char = '$';

/// First token number handed out by a fresh placeholder context.
pub const FIRST_TOKEN_INDEX: u64 = 1;

/// Frames are newline-delimited on the wire (one JSON object per line).
pub const FRAME_DELIMITER: u8 = b'\n';

/// Defaults when a config field is left untouched.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 8;
/// Max accepted length of a single encoded frame (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;
/// Capacity of the reader -> assembler channel in the assemble pipeline.
pub const DEFAULT_CHANNEL_CAP: usize = 16;
