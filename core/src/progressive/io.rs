//! Transport adapters.
//!
//! Frames travel newline-delimited: one compact JSON object per line.
//! Sync: `FrameWriter` / `FrameLines` over `std::io`. Async: tokio
//! `AsyncWrite` and a `FrameLineCodec` framed reader.
//!
//! Both readers hand raw line bytes to the frame decoder; they never
//! interpret the payload, so a line that is not UTF-8 or not JSON is a
//! payload error, not a transport error.

use std::io::{self, BufRead, Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, FramedRead};

use crate::constants::FRAME_DELIMITER;
use crate::progressive::framing::{encode_frame, Frame};
use crate::types::StreamError;

/// Canonical input abstraction
pub enum InputSource {
    Reader(Box<dyn Read + Send>),
    File(PathBuf),
    Memory(Vec<u8>),
}

/// Canonical output abstraction
pub enum OutputSink {
    Writer(Box<dyn Write + Send>),
    File(PathBuf),
    Memory,
}

pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Normalize input source into a boxed reader
pub fn open_input(src: InputSource) -> Result<Box<dyn Read + Send>, StreamError> {
    let reader: Box<dyn Read + Send> = match src {
        InputSource::Reader(r) => r,
        InputSource::File(p) => Box::new(std::fs::File::open(p)?),
        InputSource::Memory(b) => Box::new(Cursor::new(b)),
    };
    Ok(reader)
}

/// Normalize output sink into a boxed writer.
/// With `with_buf`, memory output is captured in a shared buffer the caller can read back.
pub fn open_output(
    sink: OutputSink,
    with_buf: bool,
) -> Result<(Box<dyn Write + Send>, Option<SharedBuffer>), StreamError> {
    match sink {
        OutputSink::Writer(w) => Ok((w, None)),
        OutputSink::File(p) => Ok((Box::new(io::BufWriter::new(std::fs::File::create(p)?)), None)),
        OutputSink::Memory if with_buf => {
            let buf = SharedBuffer::default();
            let writer = SharedBufferWriter { buf: buf.clone() };
            Ok((Box::new(writer), Some(buf)))
        }
        OutputSink::Memory => Ok((Box::new(io::sink()), None)),
    }
}

pub struct SharedBufferWriter {
    buf: SharedBuffer,
}

impl SharedBufferWriter {
    pub fn new(buf: SharedBuffer) -> Self {
        Self { buf }
    }
}

impl Write for SharedBufferWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .buf
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "shared buffer poisoned"))?;
        guard.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Copy out whatever a `SharedBuffer` captured.
pub fn take_buffer(buf: &SharedBuffer) -> Result<Vec<u8>, StreamError> {
    let guard = buf.lock().map_err(|_| StreamError::Pipeline("shared buffer poisoned"))?;
    Ok(guard.clone())
}

// ================= Sync framing =================

/// Writes one frame per line, flushing after each so a consumer sees it immediately.
pub struct FrameWriter<W: Write> {
    inner: W,
    frames: u64,
    bytes: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, frames: 0, bytes: 0 }
    }

    /// Returns the number of bytes written, delimiter included.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<usize, StreamError> {
        let encoded = encode_frame(frame)?;
        self.write_payload(&encoded)
    }

    /// Write an already-encoded frame.
    pub fn write_payload(&mut self, payload: &[u8]) -> Result<usize, StreamError> {
        self.inner.write_all(payload)?;
        self.inner.write_all(&[FRAME_DELIMITER])?;
        self.inner.flush()?;
        self.frames += 1;
        self.bytes += payload.len() as u64 + 1;
        Ok(payload.len() + 1)
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Splits a reader into frame payloads, one per line, delimiter stripped.
///
/// A line longer than `max_len` is discarded up to its delimiter and
/// reported as `StreamError::FrameTooLong`; reading can continue after it.
pub struct FrameLines<R: BufRead> {
    inner: R,
    max_len: usize,
    done: bool,
}

impl<R: BufRead> FrameLines<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        Self { inner, max_len, done: false }
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        let mut line = Vec::new();
        // Room for a full payload plus `\r\n`.
        let limit = self.max_len as u64 + 2;
        let n = (&mut self.inner).take(limit).read_until(FRAME_DELIMITER, &mut line)?;
        if n == 0 {
            return Ok(None);
        }

        if line.last() == Some(&FRAME_DELIMITER) {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        } else if line.len() as u64 == limit {
            let skipped = self.skip_line()?;
            return Err(StreamError::FrameTooLong { len: line.len() + skipped, max: self.max_len });
        }

        if line.len() > self.max_len {
            return Err(StreamError::FrameTooLong { len: line.len(), max: self.max_len });
        }
        Ok(Some(line))
    }

    fn skip_line(&mut self) -> Result<usize, StreamError> {
        let mut skipped = 0;
        loop {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                return Ok(skipped);
            }
            match available.iter().position(|b| *b == FRAME_DELIMITER) {
                Some(pos) => {
                    self.inner.consume(pos + 1);
                    return Ok(skipped + pos);
                }
                None => {
                    let len = available.len();
                    self.inner.consume(len);
                    skipped += len;
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for FrameLines<R> {
    type Item = Result<Vec<u8>, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                if !e.is_payload_error() {
                    self.done = true;
                }
                Some(Err(e))
            }
        }
    }
}

// ================= Async framing =================

/// Write one frame and its delimiter, then flush.
pub async fn write_frame_async<W>(writer: &mut W, frame: &Frame) -> Result<usize, StreamError>
where
    W: AsyncWrite + Unpin,
{
    let encoded = encode_frame(frame)?;
    writer.write_all(&encoded).await?;
    writer.write_all(&[FRAME_DELIMITER]).await?;
    writer.flush().await?;
    Ok(encoded.len() + 1)
}

/// Newline splitter for `FramedRead`.
///
/// An over-long line is an item (`Err(FrameTooLong)`), not a decoder
/// error: `FramedRead` ends the stream after a decoder error, and the
/// assembler wants to skip the line and keep reading. Only I/O errors
/// surface as `Decoder::Error`.
#[derive(Debug)]
pub struct FrameLineCodec {
    max_len: usize,
    /// Bytes already scanned for a delimiter.
    scanned: usize,
    /// Bytes dropped so far from an over-long line.
    discarding: Option<usize>,
}

impl FrameLineCodec {
    pub fn new(max_len: usize) -> Self {
        Self { max_len, scanned: 0, discarding: None }
    }

    fn finish_line(&self, mut line: BytesMut) -> Result<BytesMut, StreamError> {
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        if line.len() > self.max_len {
            return Err(StreamError::FrameTooLong { len: line.len(), max: self.max_len });
        }
        Ok(line)
    }
}

impl Decoder for FrameLineCodec {
    type Item = Result<BytesMut, StreamError>;
    type Error = StreamError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, StreamError> {
        let found = buf[self.scanned..]
            .iter()
            .position(|b| *b == FRAME_DELIMITER)
            .map(|pos| self.scanned + pos);

        match (self.discarding, found) {
            (Some(dropped), Some(pos)) => {
                buf.advance(pos + 1);
                self.scanned = 0;
                self.discarding = None;
                Ok(Some(Err(StreamError::FrameTooLong { len: dropped + pos, max: self.max_len })))
            }
            (Some(dropped), None) => {
                let len = buf.len();
                buf.advance(len);
                self.scanned = 0;
                self.discarding = Some(dropped + len);
                Ok(None)
            }
            (None, Some(pos)) => {
                let mut line = buf.split_to(pos + 1);
                line.truncate(pos);
                self.scanned = 0;
                Ok(Some(self.finish_line(line)))
            }
            (None, None) if buf.len() > self.max_len + 1 => {
                let len = buf.len();
                buf.advance(len);
                self.scanned = 0;
                self.discarding = Some(len);
                Ok(None)
            }
            (None, None) => {
                self.scanned = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, StreamError> {
        if let Some(item) = self.decode(buf)? {
            return Ok(Some(item));
        }
        self.scanned = 0;
        if let Some(dropped) = self.discarding.take() {
            let len = buf.len();
            buf.advance(len);
            return Ok(Some(Err(StreamError::FrameTooLong { len: dropped + len, max: self.max_len })));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        // Last line without a delimiter.
        let line = buf.split();
        Ok(Some(self.finish_line(line)))
    }
}

/// Line-delimited frame payloads from any tokio reader. Over-long lines
/// come through as `Err(FrameTooLong)` and reading continues after them.
pub fn frame_lines_async<R: AsyncRead>(
    reader: R,
    max_len: usize,
) -> impl Stream<Item = Result<BytesMut, StreamError>> {
    FramedRead::new(reader, FrameLineCodec::new(max_len)).map(|item| item.and_then(|line| line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_lines_splits_and_strips() {
        let input = b"{\"a\":1}\r\n\n{\"b\":2}".to_vec();
        let lines: Vec<Vec<u8>> = FrameLines::new(Cursor::new(input), 64)
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec![b"{\"a\":1}".to_vec(), Vec::new(), b"{\"b\":2}".to_vec()]);
    }

    #[test]
    fn frame_lines_skips_oversized_lines() {
        let input = b"0123456789abcdef\nok\n".to_vec();
        let mut lines = FrameLines::new(Cursor::new(input), 4);
        assert!(matches!(lines.next(), Some(Err(StreamError::FrameTooLong { len: 16, max: 4 }))));
        assert_eq!(lines.next().unwrap().unwrap(), b"ok".to_vec());
        assert!(lines.next().is_none());
    }

    #[test]
    fn frame_lines_crlf_payload_at_the_limit() {
        let input = b"abcd\r\nabcde\r\nok\n".to_vec();
        let mut lines = FrameLines::new(Cursor::new(input), 4);
        assert_eq!(lines.next().unwrap().unwrap(), b"abcd".to_vec());
        assert!(matches!(lines.next(), Some(Err(StreamError::FrameTooLong { len: 6, max: 4 }))));
        assert_eq!(lines.next().unwrap().unwrap(), b"ok".to_vec());
        assert!(lines.next().is_none());
    }

    #[test]
    fn line_codec_keeps_going_after_bad_lines() {
        let mut codec = FrameLineCodec::new(4);
        let mut buf = BytesMut::from(&b"\xff\xfe\r\n0123456789\nab"[..]);

        let first = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(&first[..], b"\xff\xfe");
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Err(StreamError::FrameTooLong { len: 10, max: 4 }))
        ));
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&codec.decode_eof(&mut buf).unwrap().unwrap().unwrap()[..], b"ab");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn line_codec_discards_across_reads() {
        let mut codec = FrameLineCodec::new(4);
        let mut buf = BytesMut::from(&b"0123456"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        buf.extend_from_slice(b"89\r\nabcd\r\n");
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Err(StreamError::FrameTooLong { len: 10, max: 4 }))
        ));
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap().unwrap()[..], b"abcd");
    }

    #[test]
    fn frame_writer_delimits_and_counts() {
        let mut w = FrameWriter::new(Vec::new());
        let n = w.write_frame(&Frame::Terminal).unwrap();
        assert_eq!(n, "{\"completed_stream\":true}\n".len());
        assert_eq!(w.frames_written(), 1);
        assert_eq!(w.into_inner(), b"{\"completed_stream\":true}\n".to_vec());
    }

    #[test]
    fn shared_buffer_captures_output() {
        let (mut w, buf) = open_output(OutputSink::Memory, true).unwrap();
        w.write_all(b"xyz").unwrap();
        assert_eq!(take_buffer(&buf.unwrap()).unwrap(), b"xyz".to_vec());
    }
}
