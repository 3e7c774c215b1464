//! Line-by-line consumption of process output.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

use super::lock;
use crate::process::error::StreamError;

/// Receives each complete line written by a process.
///
/// Calls happen in arrival order and never overlap. Closures taking a
/// `String` implement this trait directly.
pub trait LineConsumer: Send + 'static {
    /// Handle one line, without its trailing newline.
    fn consume(&mut self, line: String);
}

impl<F> LineConsumer for F
where
    F: FnMut(String) + Send + 'static,
{
    fn consume(&mut self, line: String) {
        self(line);
    }
}

/// Output sink that hands each line to a [`LineConsumer`].
///
/// When attached to a running process a background reader drains the pipe
/// and feeds the consumer. [`wait`](Self::wait) returns once the process
/// closed its end and every line has been delivered.
///
/// # Example
///
/// ```rust,no_run
/// use procpipe::process::{LineStream, Task};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let lines = LineStream::new(|line: String| println!("> {line}"));
///     let mut ls = Task::new("ls").arg("/tmp").stdout(lines.clone());
///     ls.run().await?;
///     lines.wait().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct LineStream {
    inner: Arc<LineInner>,
}

struct LineInner {
    consumer: Mutex<Option<Box<dyn LineConsumer>>>,
    worker: Mutex<Option<JoinHandle<usize>>>,
}

impl LineStream {
    /// Create a line stream that feeds `consumer`.
    pub fn new(consumer: impl LineConsumer) -> Self {
        Self {
            inner: Arc::new(LineInner {
                consumer: Mutex::new(Some(Box::new(consumer))),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Wait until end-of-input and until every line has been delivered.
    ///
    /// Returns immediately if the stream was never attached to a process
    /// or has already been waited on.
    pub async fn wait(&self) -> Result<(), StreamError> {
        let worker = lock(&self.inner.worker).take();
        if let Some(worker) = worker {
            let delivered = worker.await?;
            tracing::debug!(lines = delivered, "line stream drained");
        }
        Ok(())
    }

    /// Whether the stream is already attached to a process.
    pub fn is_attached(&self) -> bool {
        lock(&self.inner.consumer).is_none()
    }

    /// Start the background reader over `source`.
    ///
    /// Returns `false` if the stream was already attached.
    pub(crate) fn attach<R>(&self, source: R) -> bool
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        match self.claim() {
            Some(consumer) => {
                self.start(consumer, source);
                true
            }
            None => false,
        }
    }

    /// Take the consumer for one process output. Later claims get `None`.
    pub(crate) fn claim(&self) -> Option<Box<dyn LineConsumer>> {
        lock(&self.inner.consumer).take()
    }

    /// Hand back a consumer whose launch failed.
    pub(crate) fn restore(&self, consumer: Box<dyn LineConsumer>) {
        *lock(&self.inner.consumer) = Some(consumer);
    }

    pub(crate) fn start<R>(&self, consumer: Box<dyn LineConsumer>, source: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(deliver_lines(source, consumer));
        *lock(&self.inner.worker) = Some(handle);
    }
}

/// Read `source` to the end, feeding each line to `consumer`.
///
/// A final line without a trailing newline is still delivered.
async fn deliver_lines<R>(source: R, mut consumer: Box<dyn LineConsumer>) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    let mut delivered = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                consumer.consume(String::from_utf8_lossy(&buf).into_owned());
                delivered += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "line stream read failed");
                break;
            }
        }
    }

    delivered
}

impl fmt::Debug for LineStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineStream")
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collector() -> (LineStream, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let stream = LineStream::new(move |line: String| sink.lock().unwrap().push(line));
        (stream, lines)
    }

    #[tokio::test]
    async fn test_lines_in_order() {
        let (stream, lines) = collector();
        assert!(stream.attach(&b"first\nsecond\nthird\n"[..]));
        stream.wait().await.unwrap();

        assert_eq!(*lines.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_partial_last_line() {
        let (stream, lines) = collector();
        stream.attach(&b"done\nno newline"[..]);
        stream.wait().await.unwrap();

        assert_eq!(*lines.lock().unwrap(), vec!["done", "no newline"]);
    }

    #[tokio::test]
    async fn test_empty_lines_are_delivered() {
        let (stream, lines) = collector();
        stream.attach(&b"\n\nx\n"[..]);
        stream.wait().await.unwrap();

        assert_eq!(*lines.lock().unwrap(), vec!["", "", "x"]);
    }

    #[tokio::test]
    async fn test_attach_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let stream = LineStream::new(move |_line: String| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!stream.is_attached());
        assert!(stream.attach(&b"a\n"[..]));
        assert!(stream.is_attached());
        assert!(!stream.attach(&b"b\n"[..]));

        stream.wait().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restored_consumer_can_attach() {
        let (stream, lines) = collector();
        let consumer = stream.claim().unwrap();
        assert!(stream.is_attached());
        assert!(stream.claim().is_none());

        stream.restore(consumer);
        assert!(stream.attach(&b"again\n"[..]));
        stream.wait().await.unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["again"]);
    }

    #[tokio::test]
    async fn test_wait_without_attach() {
        let (stream, lines) = collector();
        stream.wait().await.unwrap();
        assert!(lines.lock().unwrap().is_empty());
    }

    struct Counter(Arc<AtomicUsize>);

    impl LineConsumer for Counter {
        fn consume(&mut self, _line: String) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_trait_consumer() {
        let count = Arc::new(AtomicUsize::new(0));
        let stream = LineStream::new(Counter(count.clone()));
        stream.attach(&b"1\n2\n"[..]);
        stream.wait().await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
