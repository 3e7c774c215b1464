//! Two tasks joined by a pipe.

use std::io;

use super::stream::PipeStream;
use super::task::Task;

/// Connect `producer`'s stdout to `consumer`'s stdin.
///
/// Returns both tasks ready to launch. Each must still be started and
/// waited on separately; they may finish in either order.
///
/// # Example
///
/// ```rust,no_run
/// use procpipe::process::{pipeline, PipeStream, Task};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let output = PipeStream::new()?;
///     let (mut ls, mut grep) = pipeline(
///         Task::new("ls").arg("/usr/bin"),
///         Task::new("grep").arg("zip").stdout(output.clone()),
///     )?;
///
///     ls.spawn()?;
///     grep.spawn()?;
///     println!("{}", output.read_all().await?);
///
///     ls.finish().await?;
///     grep.finish().await?;
///     Ok(())
/// }
/// ```
pub fn pipeline(producer: Task, consumer: Task) -> io::Result<(Task, Task)> {
    let connector = PipeStream::new()?;
    tracing::trace!(producer = %producer, consumer = %consumer, "connecting tasks");
    Ok((producer.stdout(connector.clone()), consumer.stdin(connector)))
}
