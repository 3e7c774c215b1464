//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// procpipe - run commands, capture their output and pipe them together
#[derive(Parser, Debug)]
#[command(name = "procpipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log more (-v for debug, -vv for trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command with inherited streams and exit with its status
    Run {
        #[command(flatten)]
        task: TaskArgs,

        /// Discard the command's stdout and stderr
        #[arg(short, long)]
        quiet: bool,

        /// Terminate the command after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Run a command and print its captured stdout and stderr
    Capture {
        #[command(flatten)]
        task: TaskArgs,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a one-line script through bash
    Bash {
        /// Script passed to `bash -c`
        script: String,
    },

    /// Print the path an executable name resolves to
    Which {
        /// Executable name or path
        name: String,
    },

    /// Pipe one command's output into another
    Pipe {
        /// Producer command line (split on whitespace)
        #[arg(long)]
        from: String,

        /// Consumer command line (split on whitespace)
        #[arg(long)]
        into: String,
    },
}

/// Options shared by commands that launch a single task.
#[derive(Args, Debug)]
pub struct TaskArgs {
    /// Working directory for the command
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Environment variable to set, as KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Executable followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("missing variable name in '{raw}'")),
        Some((key, value)) => Ok((key.to_owned(), value.to_owned())),
        None => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env() {
        assert_eq!(
            parse_env("MY_VAR=aVal"),
            Ok(("MY_VAR".to_owned(), "aVal".to_owned()))
        );
        assert_eq!(
            parse_env("EMPTY="),
            Ok(("EMPTY".to_owned(), String::new()))
        );
        assert_eq!(
            parse_env("A=b=c"),
            Ok(("A".to_owned(), "b=c".to_owned()))
        );
        assert!(parse_env("novalue").is_err());
        assert!(parse_env("=x").is_err());
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::parse_from([
            "procpipe", "run", "--cwd", "/tmp", "-e", "A=1", "--timeout", "5", "ls", "-la",
        ]);

        let Commands::Run {
            task,
            quiet,
            timeout,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert!(!quiet);
        assert_eq!(timeout, Some(5));
        assert_eq!(task.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(task.env, vec![("A".to_owned(), "1".to_owned())]);
        assert_eq!(task.command, vec!["ls", "-la"]);
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
