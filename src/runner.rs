//! External tool execution boundary
//!
//! Every external invocation in the pipeline - terraform, ssh, docker,
//! kubectl - goes through the [`CommandRunner`] trait so drivers can be
//! tested against a mock without touching real infrastructure.
//!
//! A non-zero exit is not an error at this level: the driver that issued the
//! command classifies it into the error taxonomy. Only spawn failures and
//! deadline overruns are errors here.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::{Error, Result};

/// Default deadline for commands that don't carry an explicit one
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// A single external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,
    /// Arguments, in order
    pub args: Vec<String>,
    /// Payload written to the child's stdin, if any
    pub stdin: Option<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Working directory
    pub current_dir: Option<PathBuf>,
    /// Deadline for the whole invocation
    pub timeout: Duration,
}

impl CommandSpec {
    /// Start building a command
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            env: Vec::new(),
            current_dir: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the stdin payload
    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set the invocation deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human-readable command line for logs and errors
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured output of a completed command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Whether the command exited zero
    pub success: bool,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Stderr if present, falling back to stdout.
    ///
    /// Tools are inconsistent about which stream carries the diagnostic.
    pub fn error_output(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            self.stderr.clone()
        }
    }
}

/// Trait abstracting external command execution for testability
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion, capturing its output.
    ///
    /// Returns `Err` only for spawn failures and deadline overruns; a
    /// non-zero exit comes back as a `CommandOutput` for the caller to
    /// classify.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// The real runner, backed by `tokio::process`
#[derive(Debug, Default)]
pub struct ToolRunner;

impl ToolRunner {
    /// Create a new runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ToolRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            // A timed-out child must not outlive the run: dropping the wait
            // future below has to take the process down with it.
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn()?;
        let stdin_pipe = child.stdin.take();

        // Feed stdin while draining the output pipes. Writing the whole
        // payload up front can deadlock once the child fills a pipe buffer
        // before it has consumed its stdin.
        let feed_stdin = async {
            if let (Some(mut pipe), Some(payload)) = (stdin_pipe, spec.stdin.as_deref()) {
                match pipe.write_all(payload.as_bytes()).await {
                    Ok(()) => pipe.shutdown().await.or_else(ignore_broken_pipe)?,
                    // The child may legitimately exit without reading stdin
                    Err(e) => ignore_broken_pipe(e)?,
                }
            }
            Ok::<(), std::io::Error>(())
        };

        let output = tokio::time::timeout(spec.timeout, async {
            let (fed, output) = tokio::join!(feed_stdin, child.wait_with_output());
            fed?;
            output
        })
        .await
        .map_err(|_| Error::CommandTimeout {
            command: spec.display(),
            timeout: spec.timeout,
        })??;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

fn ignore_broken_pipe(e: std::io::Error) -> std::io::Result<()> {
    if e.kind() == std::io::ErrorKind::BrokenPipe {
        Ok(())
    } else {
        Err(e)
    }
}

/// Check that a required tool is installed, with an install hint on failure
pub async fn ensure_tool<R: CommandRunner + ?Sized>(
    runner: &R,
    tool: &str,
    hint: &str,
) -> Result<()> {
    let spec = CommandSpec::new("which")
        .arg(tool)
        .timeout(Duration::from_secs(10));
    let output = runner.run(&spec).await?;
    if output.success {
        Ok(())
    } else {
        Err(Error::tool_missing(tool, hint))
    }
}
