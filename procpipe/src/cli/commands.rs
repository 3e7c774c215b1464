//! CLI command execution.
//!
//! Each subcommand builds one or two tasks and maps their exit status to
//! the process exit code.

use std::time::Duration;

use anyhow::{bail, Context, Result};

use procpipe::process::{
    capture_task, find_executable, pipeline, ExitStatus, LineStream, Output, RunError, Task,
};

use super::args::{Cli, Commands, TaskArgs};

/// Execute the parsed CLI, returning the exit code to use.
pub async fn execute(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            task,
            quiet,
            timeout,
        } => {
            let mut task = build_task(task)?;
            if quiet {
                task = task.stdout(Output::Null).stderr(Output::Null);
            }
            let status = run_with_timeout(task, timeout.map(Duration::from_secs)).await?;
            Ok(exit_code(status))
        }
        Commands::Capture { task, json } => {
            let task = build_task(task)?;
            let label = task.to_string();

            let result = match capture_task(task).await {
                Ok(result) => result,
                Err(RunError::CaptureFailed { result }) => result,
                Err(e) => return Err(e).with_context(|| format!("Failed to capture: {label}")),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("stdout:\n{}", result.stdout);
                println!("stderr:\n{}", result.stderr);
                println!("{}", result.status);
            }
            Ok(exit_code(result.status))
        }
        Commands::Bash { script } => {
            let status = run_with_timeout(Task::bash(script), None).await?;
            Ok(exit_code(status))
        }
        Commands::Which { name } => match find_executable(&name) {
            Some(path) => {
                println!("{}", path.display());
                Ok(0)
            }
            None => bail!("{name} not found"),
        },
        Commands::Pipe { from, into } => pipe(&from, &into).await,
    }
}

fn build_task(args: TaskArgs) -> Result<Task> {
    let mut words = args.command.into_iter();
    let Some(executable) = words.next() else {
        bail!("No command given");
    };

    let mut task = Task::new(executable).args(words).envs(args.env);
    if let Some(dir) = args.cwd {
        task = task.current_dir(dir);
    }
    Ok(task)
}

fn split_command(line: &str) -> Result<Task> {
    let mut words = line.split_whitespace();
    let Some(executable) = words.next() else {
        bail!("Empty command line: '{line}'");
    };
    Ok(Task::new(executable).args(words))
}

/// Run a task, forwarding Ctrl-C to it and terminating it after `timeout`.
async fn run_with_timeout(mut task: Task, timeout: Option<Duration>) -> Result<ExitStatus> {
    let label = task.to_string();
    task.spawn()
        .with_context(|| format!("Failed to start: {label}"))?;

    let signals = task.signals().context("Task has no process id")?;
    let forwarder = signals
        .forward_interrupts()
        .context("Failed to install interrupt handler")?;

    if let Some(limit) = timeout {
        let signals = signals.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            if signals.terminate() {
                tracing::warn!(pid = signals.pid(), ?limit, "terminated after timeout");
            }
        });
    }

    let status = task
        .finish()
        .await
        .with_context(|| format!("Failed to wait for: {label}"))?;
    forwarder.abort();

    tracing::info!(command = %label, %status, "command finished");
    Ok(status)
}

async fn pipe(from: &str, into: &str) -> Result<i32> {
    let lines = LineStream::new(|line: String| println!("{line}"));
    let (mut producer, mut consumer) = pipeline(
        split_command(from)?,
        split_command(into)?.stdout(lines.clone()),
    )
    .context("Failed to create pipe")?;

    producer
        .spawn()
        .with_context(|| format!("Failed to start: {from}"))?;
    consumer
        .spawn()
        .with_context(|| format!("Failed to start: {into}"))?;

    let (produced, consumed) = tokio::join!(producer.finish(), consumer.finish());
    let produced = produced?;
    let consumed = consumed?;
    lines.wait().await?;

    if !produced.success() {
        tracing::warn!(command = from, status = %produced, "producer failed");
    }
    Ok(exit_code(consumed))
}

/// Shell convention: signals map to 128 + n so callers can tell them apart.
const fn exit_code(status: ExitStatus) -> i32 {
    match status {
        ExitStatus::Exited(code) => code,
        ExitStatus::Signaled(signal) => 128 + signal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(ExitStatus::Exited(0)), 0);
        assert_eq!(exit_code(ExitStatus::Exited(3)), 3);
        assert_eq!(exit_code(ExitStatus::Signaled(15)), 143);
    }

    #[test]
    fn test_split_command() {
        let task = split_command("  grep -n  Swift ").unwrap();
        assert_eq!(task.to_string(), "grep -n Swift");
        assert!(split_command("   ").is_err());
    }

    #[test]
    fn test_build_task() {
        let task = build_task(TaskArgs {
            cwd: None,
            env: vec![("A".to_owned(), "1".to_owned())],
            command: vec!["echo".to_owned(), "hi".to_owned()],
        })
        .unwrap();
        assert_eq!(task.executable(), "echo");
        assert_eq!(task.arguments(), ["hi"]);
    }

    #[tokio::test]
    async fn test_timeout_terminates() {
        let status = run_with_timeout(
            Task::new("sleep").arg("30"),
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap();
        assert_eq!(status, ExitStatus::Signaled(15));
    }
}
