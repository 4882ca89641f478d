//! Resumable line accumulation for readiness-driven reads.

use std::{collections::VecDeque, io};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default per-source line limit, terminator included.
pub const DEFAULT_MAX_LINE: usize = 1024;

const READ_CHUNK: usize = 4096;

/// Accumulates bytes from one source and yields complete lines.
///
/// Each call to [`LineBuffer::fill`] performs a single read, so a source that
/// delivered half a line never holds up the caller; the half is kept until
/// the rest arrives. Lines longer than the limit are truncated: the first
/// `max_line - 1` bytes are kept and everything up to the next line feed is
/// dropped.
#[derive(Debug)]
pub struct LineBuffer {
    raw: BytesMut,
    pending: BytesMut,
    complete: VecDeque<Bytes>,
    max_line: usize,
    truncating: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}

impl LineBuffer {
    /// Create a buffer holding lines of at most `max_line` bytes.
    #[must_use]
    pub fn new(max_line: usize) -> Self {
        Self {
            raw: BytesMut::with_capacity(READ_CHUNK),
            pending: BytesMut::with_capacity(max_line.min(READ_CHUNK)),
            complete: VecDeque::new(),
            max_line: max_line.max(2),
            truncating: false,
        }
    }

    /// Read whatever `reader` has available right now and split it into lines.
    ///
    /// Returns the number of bytes read; zero means end-of-stream. Cancel
    /// safe: if the future is dropped before completion no data is lost.
    ///
    /// # Errors
    /// Returns the reader's error.
    pub async fn fill<R>(&mut self, reader: &mut R) -> io::Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.raw.reserve(READ_CHUNK);
        let n = reader.read_buf(&mut self.raw).await?;

        let mut raw = std::mem::take(&mut self.raw);
        self.push(&raw);
        raw.clear();
        self.raw = raw;

        Ok(n)
    }

    /// Feed bytes directly.
    pub fn push(&mut self, data: &[u8]) {
        let mut rest = data;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.append(&rest[..pos]);
            self.pending.extend_from_slice(b"\n");
            self.complete.push_back(self.pending.split().freeze());
            self.truncating = false;
            rest = &rest[pos + 1..];
        }
        self.append(rest);
    }

    /// Next complete line, terminator included.
    pub fn next_line(&mut self) -> Option<Bytes> {
        self.complete.pop_front()
    }

    /// Take the unterminated tail left at end-of-stream, if any.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.truncating = false;
        (!self.pending.is_empty()).then(|| self.pending.split().freeze())
    }

    /// Whether an unterminated line is buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }

    fn append(&mut self, chunk: &[u8]) {
        let room = (self.max_line - 1).saturating_sub(self.pending.len());
        if chunk.len() > room && !self.truncating {
            tracing::debug!(max_line = self.max_line, "Line too long, discarding remainder");
            self.truncating = true;
        }
        self.pending.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
}
