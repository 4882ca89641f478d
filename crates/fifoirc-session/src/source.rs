//! Local input sources: the named pipe and the external program.

use std::io;

use bytes::Bytes;
use fifoirc_core::{BoxedReader, BoxedWriter, Duplex};
use fifoirc_transport::LineBuffer;
use tokio::{
    io::AsyncWriteExt,
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

/// Forwarded messages that may wait for the program to read its input.
pub const INPUT_QUEUE: usize = 64;

/// One open local stream and its partial-line buffer.
///
/// The pipe only has a read side. The program stream also has an input
/// side, fed by its own task from a bounded queue so a program that stops
/// reading cannot stall the loop.
pub struct LocalSource {
    reader: BoxedReader,
    input: Option<Input>,
    lines: LineBuffer,
}

struct Input {
    queue: mpsc::Sender<Bytes>,
    task: JoinHandle<()>,
}

impl LocalSource {
    /// Wrap a read-only stream.
    #[must_use]
    pub fn reader(reader: BoxedReader) -> Self {
        Self {
            reader,
            input: None,
            lines: LineBuffer::default(),
        }
    }

    /// Wrap a bidirectional stream. Must be called inside a runtime.
    #[must_use]
    pub fn duplex(duplex: Duplex) -> Self {
        let (queue, pending) = mpsc::channel(INPUT_QUEUE);
        let task = tokio::spawn(write_input(duplex.writer, pending));
        Self {
            reader: duplex.reader,
            input: Some(Input { queue, task }),
            lines: LineBuffer::default(),
        }
    }

    /// Read once. Zero means end-of-stream.
    ///
    /// # Errors
    /// Returns the stream's read error.
    pub async fn fill(&mut self) -> io::Result<usize> {
        self.lines.fill(&mut self.reader).await
    }

    /// Next complete line.
    pub fn next_line(&mut self) -> Option<Bytes> {
        self.lines.next_line()
    }

    /// Unterminated tail left over at end-of-stream.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.lines.finish()
    }

    /// Queue `data` for the stream's input side without waiting.
    ///
    /// # Errors
    /// `Full` when the reader is behind by [`INPUT_QUEUE`] messages; `Closed`
    /// when there is no input side or a write to it has failed.
    pub fn try_write(&self, data: Bytes) -> Result<(), TrySendError<Bytes>> {
        match &self.input {
            Some(input) => input.queue.try_send(data),
            None => Err(TrySendError::Closed(data)),
        }
    }
}

impl Drop for LocalSource {
    fn drop(&mut self) {
        if let Some(input) = &self.input {
            input.task.abort();
        }
    }
}

impl std::fmt::Debug for LocalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSource")
            .field("writable", &self.input.is_some())
            .field("partial", &self.lines.has_partial())
            .finish_non_exhaustive()
    }
}

// Ends on the first write error, which closes the queue.
async fn write_input(mut writer: BoxedWriter, mut pending: mpsc::Receiver<Bytes>) {
    while let Some(data) = pending.recv().await {
        let written = match writer.write_all(&data).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!("Write to program input failed: {e}");
            return;
        }
    }
}

/// Fill an optional source. An absent source never becomes ready.
pub async fn fill_source(source: Option<&mut LocalSource>) -> io::Result<usize> {
    match source {
        Some(source) => source.fill().await,
        None => std::future::pending().await,
    }
}
