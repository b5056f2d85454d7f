// ## Pipeline wiring: producer → sink, source → assembler

use std::io::{BufReader, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::bounded;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::constants::DEFAULT_CHANNEL_CAP;
use crate::progressive::assembler::{AssembleConfig, AssembleError, Assembler};
use crate::progressive::io::{frame_lines_async, write_frame_async, FrameLines, FrameWriter};
use crate::progressive::placeholder::Token;
use crate::progressive::streamer::{ProgressiveStreamer, StreamReport};
use crate::telemetry::{Stage, TelemetrySnapshot};
use crate::types::StreamError;

/// What a finished producer run leaves behind.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub telemetry: TelemetrySnapshot,
    pub report: StreamReport,
    pub frames_written: u64,
    /// Captured sink bytes, when the sink was an in-memory buffer.
    pub output: Option<Vec<u8>>,
}

/// What a finished assembly leaves behind.
#[derive(Debug, Clone)]
pub struct AssembleOutcome {
    pub document: Value,
    pub telemetry: TelemetrySnapshot,
    pub issues: Vec<AssembleError>,
    /// Tokens still sitting in the document as placeholders.
    pub unresolved: Vec<Token>,
}

impl AssembleOutcome {
    fn from_assembler(assembler: Assembler) -> Self {
        let telemetry = assembler.telemetry();
        let issues = assembler.issues().to_vec();
        let unresolved = assembler.pending_tokens();
        Self { document: assembler.into_document(), telemetry, issues, unresolved }
    }
}

// ============================================================
// Stream pipeline
// ============================================================

/// Pull every frame, write it as one line and flush, until the terminal
/// frame. An aborted stream returns its error; nothing after it is written.
pub fn run_stream_pipeline<W: Write>(
    mut streamer: ProgressiveStreamer,
    writer: W,
) -> Result<StreamOutcome, StreamError> {
    let mut out = FrameWriter::new(writer);

    while let Some(frame) = streamer.next_frame() {
        let frame = frame?;
        let started = Instant::now();
        let written = out.write_frame(&frame)?;
        streamer.record_stage(Stage::Write, started.elapsed());
        streamer.record_bytes_out(written);
    }

    debug!(frames = out.frames_written(), bytes = out.bytes_written(), "stream pipeline finished");
    Ok(StreamOutcome {
        telemetry: streamer.telemetry(),
        report: streamer.report().clone(),
        frames_written: out.frames_written(),
        output: None,
    })
}

pub async fn run_stream_pipeline_async<W>(
    mut streamer: ProgressiveStreamer,
    mut writer: W,
) -> Result<StreamOutcome, StreamError>
where
    W: AsyncWrite + Unpin,
{
    let mut frames_written = 0u64;

    while let Some(frame) = streamer.next_frame_async().await {
        let frame = frame?;
        let started = Instant::now();
        let written = write_frame_async(&mut writer, &frame).await?;
        streamer.record_stage(Stage::Write, started.elapsed());
        streamer.record_bytes_out(written);
        frames_written += 1;
    }

    debug!(frames = frames_written, "async stream pipeline finished");
    Ok(StreamOutcome {
        telemetry: streamer.telemetry(),
        report: streamer.report().clone(),
        frames_written,
        output: None,
    })
}

// ============================================================
// Assemble pipeline
// ============================================================

/// Reader thread splits lines into a bounded channel; the calling thread
/// applies them in order.
///
/// `Stage::Read` is the time the calling thread spent waiting on the
/// channel, so every recorded stage lies inside the assembler's elapsed
/// window.
///
/// The reader thread is not joined. Once the assembler is done it drops
/// the receiver, and the reader exits on its next send.
pub fn run_assemble_pipeline<R>(reader: R, config: AssembleConfig) -> Result<AssembleOutcome, StreamError>
where
    R: Read + Send + 'static,
{
    config.validate()?;
    let mut assembler = Assembler::new(config);
    let (line_tx, line_rx) = bounded::<Result<Vec<u8>, StreamError>>(DEFAULT_CHANNEL_CAP);
    let max_len = config.max_frame_len;

    thread::Builder::new()
        .name("frame-reader".into())
        .spawn(move || {
            for line in FrameLines::new(BufReader::new(reader), max_len) {
                if line_tx.send(line).is_err() {
                    debug!("assembler gone, reader stopping");
                    break;
                }
            }
        })?;

    let mut read_time = Duration::ZERO;
    let lines = std::iter::from_fn(|| {
        let started = Instant::now();
        let line = line_rx.recv().ok();
        read_time += started.elapsed();
        line
    });
    let result = assembler.consume(lines);
    assembler.record_stage(Stage::Read, read_time);
    result?;

    Ok(AssembleOutcome::from_assembler(assembler))
}

pub async fn run_assemble_pipeline_async<R>(
    reader: R,
    config: AssembleConfig,
) -> Result<AssembleOutcome, StreamError>
where
    R: AsyncRead,
{
    config.validate()?;
    let lines = frame_lines_async(reader, config.max_frame_len);
    let mut assembler = Assembler::new(config);
    assembler.consume_async(lines).await?;
    Ok(AssembleOutcome::from_assembler(assembler))
}
