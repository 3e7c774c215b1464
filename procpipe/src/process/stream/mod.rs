//! Stream assignments for a child's stdin, stdout and stderr.
//!
//! [`Input`] and [`Output`] tag what an endpoint can do: a [`LineStream`]
//! only consumes output, so it exists only as an [`Output`]. Both default to
//! inheriting the parent's descriptor.

mod line;
mod pipe;

pub use line::{LineConsumer, LineStream};
pub use pipe::PipeStream;

use std::fs::{File, OpenOptions};
use std::io::{self, PipeReader, PipeWriter};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::io::AsyncRead;
use tokio::process::Child;

use super::error::TaskError;

/// Where a child reads its standard input from.
#[derive(Debug, Clone, Default)]
pub enum Input {
    /// The parent's stdin.
    #[default]
    Inherit,
    /// Empty input (`/dev/null`).
    Null,
    /// Read from a file.
    File(PathBuf),
    /// Read from the read end of a pipe.
    Pipe(PipeStream),
}

/// Where a child writes its standard output or error.
#[derive(Debug, Clone, Default)]
pub enum Output {
    /// The parent's descriptor.
    #[default]
    Inherit,
    /// Discard (`/dev/null`).
    Null,
    /// Create or truncate a file.
    File(PathBuf),
    /// Create or append to a file.
    Append(PathBuf),
    /// Write into a pipe.
    Pipe(PipeStream),
    /// Deliver line by line to a consumer.
    Line(LineStream),
}

/// Output descriptor of a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Stream endpoints taken for one launch attempt.
///
/// The child gets duplicates of the pipe ends; the originals stay here so a
/// failed launch can hand them back with [`release`](Self::release). After
/// a successful launch [`commit`](Self::commit) closes the parent copies and
/// starts the background readers.
#[derive(Default)]
pub(crate) struct Claims {
    held: Vec<Claim>,
}

enum Claim {
    Reader(PipeStream, PipeReader),
    Writer(PipeStream, PipeWriter),
    Line(LineStream, Box<dyn LineConsumer>, Channel),
}

impl Claims {
    /// Return every claimed endpoint to its stream.
    pub(crate) fn release(self) {
        for claim in self.held {
            match claim {
                Claim::Reader(pipe, reader) => pipe.restore_reader(reader),
                Claim::Writer(pipe, writer) => pipe.restore_writer(writer),
                Claim::Line(line, consumer, _) => line.restore(consumer),
            }
        }
    }

    /// Finish wiring a launched child. Must run inside a tokio runtime.
    pub(crate) fn commit(self, child: &mut Child) {
        for claim in self.held {
            match claim {
                Claim::Reader(_, reader) => drop(reader),
                Claim::Writer(pipe, writer) => {
                    drop(writer);
                    pipe.drain();
                }
                Claim::Line(line, consumer, channel) => {
                    let source: Option<Box<dyn AsyncRead + Unpin + Send>> = match channel {
                        Channel::Stdout => child.stdout.take().map(|s| Box::new(s) as _),
                        Channel::Stderr => child.stderr.take().map(|s| Box::new(s) as _),
                    };
                    match source {
                        Some(source) => line.start(consumer, source),
                        None => {
                            tracing::warn!(stream = channel.name(), "child has no piped output");
                            line.restore(consumer);
                        }
                    }
                }
            }
        }
    }
}

impl Input {
    pub(crate) fn to_stdio(&self, executable: &str, claims: &mut Claims) -> Result<Stdio, TaskError> {
        let stream_error = |source: io::Error| TaskError::Stream {
            stream: "stdin",
            executable: executable.to_owned(),
            source,
        };

        match self {
            Self::Inherit => Ok(Stdio::inherit()),
            Self::Null => Ok(Stdio::null()),
            Self::File(path) => File::open(path).map(Stdio::from).map_err(stream_error),
            Self::Pipe(pipe) => {
                let reader = pipe
                    .take_reader()
                    .ok_or(TaskError::StreamClaimed { stream: "stdin" })?;
                match reader.try_clone() {
                    Ok(copy) => {
                        claims.held.push(Claim::Reader(pipe.clone(), reader));
                        Ok(Stdio::from(copy))
                    }
                    Err(source) => {
                        pipe.restore_reader(reader);
                        Err(stream_error(source))
                    }
                }
            }
        }
    }
}

impl Output {
    pub(crate) fn to_stdio(
        &self,
        channel: Channel,
        executable: &str,
        claims: &mut Claims,
    ) -> Result<Stdio, TaskError> {
        let name = channel.name();
        let stream_error = |source: io::Error| TaskError::Stream {
            stream: name,
            executable: executable.to_owned(),
            source,
        };

        match self {
            Self::Inherit => Ok(Stdio::inherit()),
            Self::Null => Ok(Stdio::null()),
            Self::File(path) => File::create(path).map(Stdio::from).map_err(stream_error),
            Self::Append(path) => OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map(Stdio::from)
                .map_err(stream_error),
            Self::Pipe(pipe) => {
                let writer = pipe
                    .take_writer()
                    .ok_or(TaskError::StreamClaimed { stream: name })?;
                match writer.try_clone() {
                    Ok(copy) => {
                        claims.held.push(Claim::Writer(pipe.clone(), writer));
                        Ok(Stdio::from(copy))
                    }
                    Err(source) => {
                        pipe.restore_writer(writer);
                        Err(stream_error(source))
                    }
                }
            }
            // The reader is started once the child exists.
            Self::Line(line) => {
                let consumer = line
                    .claim()
                    .ok_or(TaskError::StreamClaimed { stream: name })?;
                claims.held.push(Claim::Line(line.clone(), consumer, channel));
                Ok(Stdio::piped())
            }
        }
    }
}

impl From<PipeStream> for Input {
    fn from(pipe: PipeStream) -> Self {
        Self::Pipe(pipe)
    }
}

impl From<PipeStream> for Output {
    fn from(pipe: PipeStream) -> Self {
        Self::Pipe(pipe)
    }
}

impl From<LineStream> for Output {
    fn from(line: LineStream) -> Self {
        Self::Line(line)
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_inherit() {
        assert!(matches!(Input::default(), Input::Inherit));
        assert!(matches!(Output::default(), Output::Inherit));
    }

    #[test]
    fn test_pipe_end_claimed_once() {
        let pipe = PipeStream::new().unwrap();
        let output = Output::from(pipe.clone());
        let mut claims = Claims::default();

        assert!(output.to_stdio(Channel::Stdout, "echo", &mut claims).is_ok());
        assert!(!pipe.is_write_open());
        assert!(matches!(
            output.to_stdio(Channel::Stdout, "echo", &mut claims),
            Err(TaskError::StreamClaimed { stream: "stdout" })
        ));

        let input = Input::from(pipe);
        assert!(input.to_stdio("cat", &mut claims).is_ok());
        assert!(matches!(
            input.to_stdio("cat", &mut claims),
            Err(TaskError::StreamClaimed { stream: "stdin" })
        ));
    }

    #[test]
    fn test_line_stream_claimed_once() {
        let line = LineStream::new(|_line: String| {});
        let output = Output::from(line.clone());
        let mut claims = Claims::default();

        assert!(output.to_stdio(Channel::Stdout, "ls", &mut claims).is_ok());
        assert!(matches!(
            output.to_stdio(Channel::Stderr, "ls", &mut claims),
            Err(TaskError::StreamClaimed { stream: "stderr" })
        ));
    }

    #[test]
    fn test_release_returns_ends() {
        let pipe = PipeStream::new().unwrap();
        let line = LineStream::new(|_line: String| {});
        let mut claims = Claims::default();

        Input::from(pipe.clone()).to_stdio("cat", &mut claims).unwrap();
        Output::from(pipe.clone())
            .to_stdio(Channel::Stdout, "cat", &mut claims)
            .unwrap();
        Output::from(line.clone())
            .to_stdio(Channel::Stderr, "cat", &mut claims)
            .unwrap();
        assert!(!pipe.is_write_open());
        assert!(line.is_attached());

        claims.release();
        assert!(pipe.is_write_open());
        assert!(!line.is_attached());
        assert!(pipe.take_reader().is_some());
    }

    #[test]
    fn test_missing_input_file() {
        let dir = TempDir::new().unwrap();
        let input = Input::File(dir.path().join("missing.txt"));

        assert!(matches!(
            input.to_stdio("cat", &mut Claims::default()),
            Err(TaskError::Stream { stream: "stdin", .. })
        ));
    }
}
