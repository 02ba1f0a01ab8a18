//! Utilities for running commands inside a network namespace.

use std::{fmt, io, process::Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::namespace::NetworkNamespace;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty command provided")]
    Empty,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("non-zero exit status: {0}")]
    NonZero(Output),
    #[error("command cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// The exit code, `None` if the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    /// Stdout followed by stderr, the same text a shell would show for `2>&1`.
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len());
        combined.push_str(&self.stdout);
        combined.push_str(&self.stderr);
        combined
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "exit code {code}")?,
            None => write!(f, "terminated by signal")?,
        }

        let combined = self.combined();
        let combined = combined.trim();
        if !combined.is_empty() {
            write!(f, ": {combined}")?;
        }

        Ok(())
    }
}

impl From<std::process::Output> for Output {
    fn from(value: std::process::Output) -> Self {
        Self {
            status: value.status.code(),
            stdout: String::from_utf8_lossy(&value.stdout).to_string(),
            stderr: String::from_utf8_lossy(&value.stderr).to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Runs a program inside a target network namespace.
///
/// Implementations must return [`Error::NonZero`] for a non-zero exit status and
/// [`Error::Cancelled`] as soon as `cancel` fires, without waiting for the program to finish.
#[async_trait]
pub trait CommandRunner: Send + Sync + fmt::Debug {
    async fn run(
        &self,
        namespace: &NetworkNamespace,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<Output>;
}

/// A [`CommandRunner`] that enters the namespace with `nsenter --net=<path>`.
#[derive(Debug, Clone)]
pub struct NsenterRunner {
    nsenter: String,
    sudo: bool,
}

impl Default for NsenterRunner {
    fn default() -> Self {
        Self { nsenter: "nsenter".to_string(), sudo: false }
    }
}

impl NsenterRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `nsenter` binary to use.
    pub fn with_program(mut self, nsenter: impl Into<String>) -> Self {
        self.nsenter = nsenter.into();
        self
    }

    /// Prefix every command with `sudo`, for daemons that don't run as root.
    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// Builds the command that runs `program` in `namespace`.
    pub fn command(&self, namespace: &NetworkNamespace, program: &str, args: &[String]) -> Command {
        let mut cmd = if self.sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(&self.nsenter);
            cmd
        } else {
            Command::new(&self.nsenter)
        };

        cmd.arg(format!("--net={}", namespace.path().display())).arg("--").arg(program).args(args);
        cmd
    }
}

#[async_trait]
impl CommandRunner for NsenterRunner {
    async fn run(
        &self,
        namespace: &NetworkNamespace,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<Output> {
        if program.is_empty() {
            return Err(Error::Empty);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut cmd = self.command(namespace, program, args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        tracing::debug!(?cmd, %namespace, "running command");

        let child = cmd.spawn()?;
        let output: Output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Dropping the pending future drops the child, which kills it.
                tracing::debug!(?cmd, "command cancelled");
                return Err(Error::Cancelled);
            }
            res = child.wait_with_output() => res?.into(),
        };

        if !output.success() {
            tracing::debug!(status = ?output.status, stderr = %output.stderr.trim(), ?cmd, "command returned non-zero status");
            return Err(Error::NonZero(output));
        }

        Ok(output)
    }
}
