//! Bounded background capture of a child's output streams.

use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const READ_CHUNK: usize = 8 * 1024;
const SETTLE_POLL: Duration = Duration::from_millis(5);

/// Bytes captured from one stream, possibly truncated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedStream {
    bytes: Vec<u8>,
    truncated: bool,
}

impl CapturedStream {
    /// Raw captured bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Captured bytes decoded lossily as UTF-8.
    #[must_use]
    pub fn lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Whether output beyond the capture limit was discarded.
    #[must_use]
    pub const fn truncated(&self) -> bool {
        self.truncated
    }

    /// Appends `bytes`, then drops the oldest bytes beyond `limit`.
    fn push_tail(&mut self, bytes: impl IntoIterator<Item = u8>, limit: usize) {
        self.bytes.extend(bytes);
        let excess = self.bytes.len().saturating_sub(limit);
        if excess > 0 {
            self.bytes.drain(..excess);
            self.truncated = true;
        }
    }
}

/// Captured standard output and standard error of a finished child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Captured standard output.
    pub stdout: CapturedStream,
    /// Captured standard error.
    pub stderr: CapturedStream,
}

impl CapturedOutput {
    /// Standard output decoded lossily as UTF-8.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        self.stdout.lossy()
    }

    /// Standard error decoded lossily as UTF-8.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        self.stderr.lossy()
    }
}

/// Drains a pipe on a dedicated thread, keeping the last `limit` bytes.
///
/// Older bytes are discarded once the window is full so the writer never
/// blocks and the final lines of output always survive.
#[derive(Debug)]
pub(crate) struct StreamCapture {
    buffer: Arc<Mutex<CapturedStream>>,
    reader: JoinHandle<()>,
}

impl StreamCapture {
    pub(crate) fn spawn<R>(mut source: R, limit: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(CapturedStream::default()));
        let sink = Arc::clone(&buffer);
        let reader = thread::spawn(move || {
            let mut chunk = [0_u8; READ_CHUNK];
            loop {
                let read = match source.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(read) => read,
                };
                let mut captured = sink.lock().unwrap_or_else(PoisonError::into_inner);
                captured.push_tail(chunk.iter().take(read).copied(), limit);
            }
        });
        Self { buffer, reader }
    }

    /// Whether the pipe has closed and every byte has been read.
    pub(crate) fn is_closed(&self) -> bool {
        self.reader.is_finished()
    }

    /// Waits up to `settle` for the pipe to close, then snapshots the buffer.
    ///
    /// A grandchild that inherited the pipe may keep it open indefinitely, so
    /// the reader thread is detached rather than joined once `settle` expires.
    pub(crate) fn finish(self, settle: Duration) -> CapturedStream {
        let deadline = Instant::now() + settle;
        while !self.reader.is_finished() && Instant::now() < deadline {
            thread::sleep(SETTLE_POLL);
        }
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
