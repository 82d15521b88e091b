//! External command execution.
//!
//! Commands run one at a time. Output is tee'd line by line to this
//! process's own stdout/stderr while also being captured for error reports.
//! A non-zero exit is returned as [`Error::Command`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::error::{Error, Result};

/// A command to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory, the current one when `None`
    pub dir: Option<PathBuf>,
    /// Extra environment on top of the inherited one
    pub env: Vec<(String, String)>,
    /// How the command appears in logs and errors, when the real arguments
    /// carry secrets
    pub display: Option<String>,
}

impl CommandSpec {
    /// A program with arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// A script run through `bash -c`.
    pub fn bash(script: impl Into<String>) -> Self {
        Self::new("bash", ["-c".to_string(), script.into()])
    }

    /// A script run through `sh -c`.
    pub fn sh(script: impl Into<String>) -> Self {
        Self::new("sh", ["-c".to_string(), script.into()])
    }

    /// Run in `dir`.
    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Override how the command is shown in logs and errors.
    pub fn displayed_as(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Printable command line. Shell scripts show only the script.
    pub fn describe(&self) -> String {
        if let Some(display) = &self.display {
            return display.clone();
        }
        match self.args.as_slice() {
            [flag, script] if flag == "-c" => script.clone(),
            args if args.is_empty() => self.program.clone(),
            args => format!("{} {}", self.program, args.join(" ")),
        }
    }
}

/// Captured result of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Exit code
    pub code: Option<i32>,
}

/// Runs external commands.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion; a non-zero exit is an `Error::Command`.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// [`CommandRunner`] spawning real processes.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    cancel: CancellationToken,
    env: Vec<(String, String)>,
}

impl ShellRunner {
    /// Runner whose children are killed when `cancel` fires.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            env: Vec::new(),
        }
    }

    /// Environment added to every child, e.g. the resolved `KUBECONFIG`.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

async fn tee<R, W>(reader: Option<R>, mut sink: W) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(reader) = reader else {
        return Ok(String::new());
    };
    let mut reader = BufReader::new(reader);
    let mut captured = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        sink.write_all(&line).await?;
        sink.flush().await?;
        captured.extend_from_slice(&line);
    }
    Ok(String::from_utf8_lossy(&captured).into_owned())
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let command = spec.describe();
        info!(command = %command, dir = ?spec.dir, "Running command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Io(e).context(format!("spawning `{}`", command)))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let finished = async {
            let (out, err, status) = tokio::join!(
                tee(stdout, tokio::io::stdout()),
                tee(stderr, tokio::io::stderr()),
                child.wait()
            );
            Ok::<_, std::io::Error>((out?, err?, status?))
        };

        let (stdout, stderr, status) = tokio::select! {
            _ = self.cancel.cancelled() => {
                warn!(command = %command, "Command cancelled");
                return Err(Error::Cancelled(format!("running `{}`", command)));
            }
            result = finished => {
                result.map_err(|e| Error::Io(e).context(format!("running `{}`", command)))?
            }
        };

        let code = status.code();
        if !status.success() {
            warn!(command = %command, code = ?code, "Command failed");
            return Err(Error::Command {
                command,
                code,
                stdout,
                stderr,
            });
        }

        debug!(command = %command, "Command succeeded");
        Ok(CommandOutput {
            stdout,
            stderr,
            code,
        })
    }
}
