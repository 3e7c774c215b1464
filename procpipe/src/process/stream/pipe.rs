//! Buffered OS pipe shared between the parent and child processes.

use std::fmt;
use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::mem;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use super::lock;
use crate::process::error::StreamError;

/// Handle to one OS pipe.
///
/// Clones share the same pipe. The write end belongs to the task that has
/// the pipe as stdout/stderr, the read end to the task that has it as
/// stdin. A read end assigned to a consumer task is reserved for it from
/// that moment on. When a producer launches and nobody reserved the read
/// end, a background worker starts draining it so the producer never
/// blocks on a full pipe; [`read_all`](Self::read_all) returns what it
/// collected.
///
/// # Example
///
/// ```rust,no_run
/// use procpipe::process::{PipeStream, Task};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let input = PipeStream::new()?;
///     let output = PipeStream::new()?;
///
///     let mut sort = Task::new("sort").stdin(input.clone()).stdout(output.clone());
///     sort.spawn()?;
///
///     input.write("beta")?;
///     input.write("alpha")?;
///     input.close_write();
///
///     sort.finish().await?;
///     assert_eq!(output.read_all().await?, "alpha\nbeta\n");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct PipeStream {
    inner: Arc<PipeInner>,
}

struct PipeInner {
    reader: Mutex<ReadEnd>,
    writer: Mutex<Option<PipeWriter>>,
}

enum ReadEnd {
    /// Held by the parent; `reserved` once a consumer task claims it.
    Open { reader: PipeReader, reserved: bool },
    /// A worker is reading everything into memory.
    Draining(JoinHandle<io::Result<Vec<u8>>>),
    /// Consumed or handed to a child.
    Closed,
}

impl PipeStream {
    /// Create a new pipe with both ends held by the parent.
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = io::pipe()?;
        Ok(Self {
            inner: Arc::new(PipeInner {
                reader: Mutex::new(ReadEnd::Open {
                    reader,
                    reserved: false,
                }),
                writer: Mutex::new(Some(writer)),
            }),
        })
    }

    /// Write a line of text followed by a newline.
    ///
    /// Blocks while the pipe buffer is full.
    pub fn write(&self, line: &str) -> Result<(), StreamError> {
        let mut writer = lock(&self.inner.writer);
        let writer = writer.as_mut().ok_or(StreamError::WriteClosed)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write text exactly as given, without a trailing newline.
    pub fn write_raw(&self, text: &str) -> Result<(), StreamError> {
        let mut writer = lock(&self.inner.writer);
        let writer = writer.as_mut().ok_or(StreamError::WriteClosed)?;
        writer.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Close the parent's write end.
    ///
    /// The reader sees end-of-input once every other copy of the write end
    /// (held by a child process) is closed too.
    pub fn close_write(&self) {
        if lock(&self.inner.writer).take().is_some() {
            tracing::trace!("closed pipe write end");
        }
    }

    /// Whether the parent still holds the write end.
    pub fn is_write_open(&self) -> bool {
        lock(&self.inner.writer).is_some()
    }

    /// Read everything until the write end closes.
    ///
    /// The content is returned unchanged, including any trailing newline.
    /// Once the read end has been consumed, or when it belongs to a
    /// consumer task, this returns an empty string.
    pub async fn read_all(&self) -> Result<String, StreamError> {
        let worker = {
            let mut end = lock(&self.inner.reader);
            match mem::replace(&mut *end, ReadEnd::Closed) {
                ReadEnd::Open {
                    reader,
                    reserved: false,
                } => spawn_drain(reader),
                ReadEnd::Draining(worker) => worker,
                reserved @ ReadEnd::Open { reserved: true, .. } => {
                    *end = reserved;
                    return Ok(String::new());
                }
                ReadEnd::Closed => return Ok(String::new()),
            }
        };

        let bytes = worker.await??;
        tracing::trace!(bytes = bytes.len(), "drained pipe");
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read everything and strip exactly one trailing newline.
    pub async fn read_trimmed(&self) -> Result<String, StreamError> {
        let mut content = self.read_all().await?;
        if content.ends_with('\n') {
            content.pop();
        }
        Ok(content)
    }

    /// Read everything and split it into lines.
    pub async fn read_lines(&self) -> Result<Vec<String>, StreamError> {
        let content = self.read_all().await?;
        Ok(content.lines().map(str::to_owned).collect())
    }

    /// Reserve the read end for a consumer task.
    pub(crate) fn reserve_reader(&self) {
        if let ReadEnd::Open { reserved, .. } = &mut *lock(&self.inner.reader) {
            *reserved = true;
        }
    }

    pub(crate) fn take_reader(&self) -> Option<PipeReader> {
        let mut end = lock(&self.inner.reader);
        match mem::replace(&mut *end, ReadEnd::Closed) {
            ReadEnd::Open { reader, .. } => Some(reader),
            other => {
                *end = other;
                None
            }
        }
    }

    /// Give back a read end taken for a launch that failed.
    pub(crate) fn restore_reader(&self, reader: PipeReader) {
        *lock(&self.inner.reader) = ReadEnd::Open {
            reader,
            reserved: true,
        };
    }

    pub(crate) fn take_writer(&self) -> Option<PipeWriter> {
        lock(&self.inner.writer).take()
    }

    pub(crate) fn restore_writer(&self, writer: PipeWriter) {
        *lock(&self.inner.writer) = Some(writer);
    }

    /// Start draining the read end in the background, unless a consumer
    /// task owns it. Must be called from within a tokio runtime.
    pub(crate) fn drain(&self) {
        let mut end = lock(&self.inner.reader);
        if matches!(&*end, ReadEnd::Open { reserved: false, .. }) {
            if let ReadEnd::Open { reader, .. } = mem::replace(&mut *end, ReadEnd::Closed) {
                *end = ReadEnd::Draining(spawn_drain(reader));
                tracing::trace!("draining pipe in background");
            }
        }
    }
}

fn spawn_drain(mut reader: PipeReader) -> JoinHandle<io::Result<Vec<u8>>> {
    tokio::task::spawn_blocking(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

impl fmt::Debug for PipeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let read_end = match &*lock(&self.inner.reader) {
            ReadEnd::Open {
                reserved: false, ..
            } => "open",
            ReadEnd::Open { reserved: true, .. } => "reserved",
            ReadEnd::Draining(_) => "draining",
            ReadEnd::Closed => "closed",
        };
        f.debug_struct("PipeStream")
            .field("read_end", &read_end)
            .field("write_open", &self.is_write_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let pipe = PipeStream::new().unwrap();
        pipe.write("hello").unwrap();
        pipe.write_raw("world").unwrap();
        pipe.close_write();

        assert_eq!(pipe.read_all().await.unwrap(), "hello\nworld");
    }

    #[tokio::test]
    async fn test_read_trimmed_strips_one_newline() {
        let pipe = PipeStream::new().unwrap();
        pipe.write_raw("a\n\n").unwrap();
        pipe.close_write();

        assert_eq!(pipe.read_trimmed().await.unwrap(), "a\n");
    }

    #[tokio::test]
    async fn test_read_lines() {
        let pipe = PipeStream::new().unwrap();
        pipe.write("one").unwrap();
        pipe.write("two").unwrap();
        pipe.close_write();

        assert_eq!(pipe.read_lines().await.unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_second_read_is_empty() {
        let pipe = PipeStream::new().unwrap();
        pipe.write("once").unwrap();
        pipe.close_write();

        assert_eq!(pipe.read_all().await.unwrap(), "once\n");
        assert_eq!(pipe.read_all().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let pipe = PipeStream::new().unwrap();
        pipe.close_write();

        assert!(!pipe.is_write_open());
        assert!(matches!(pipe.write("late"), Err(StreamError::WriteClosed)));
        assert_eq!(pipe.read_all().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_clones_share_the_pipe() {
        let pipe = PipeStream::new().unwrap();
        let writer = pipe.clone();
        writer.write("shared").unwrap();
        writer.close_write();

        assert!(!pipe.is_write_open());
        assert_eq!(pipe.read_all().await.unwrap(), "shared\n");
    }

    #[tokio::test]
    async fn test_reserved_read_end_is_not_read() {
        let pipe = PipeStream::new().unwrap();
        pipe.reserve_reader();
        pipe.write("for the consumer").unwrap();
        pipe.close_write();

        assert_eq!(pipe.read_all().await.unwrap(), "");
        pipe.drain();
        assert!(pipe.take_reader().is_some());
    }

    #[tokio::test]
    async fn test_drain_collects_before_read() {
        let pipe = PipeStream::new().unwrap();
        pipe.drain();

        // More than a pipe buffer holds; only completes if the drain reads.
        let chunk = "x".repeat(1024);
        for _ in 0..256 {
            pipe.write_raw(&chunk).unwrap();
        }
        pipe.close_write();

        assert_eq!(pipe.read_all().await.unwrap().len(), 256 * 1024);
    }
}
