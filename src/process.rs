// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External process execution.
//!
//! Everything wpclone does to the outside world goes through a program
//! invocation: `docker`, `ssh`, `rsync`. Commands are always built as argument
//! vectors, never as interpolated shell strings, and always carry a time
//! limit so that an unreachable host cannot hang a clone forever.
//!
//! The [`Process`] trait is the seam between the clone pipeline and the real
//! world. [`TokioProcess`] is the real thing.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::File,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Structured description of one program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    stdin: Option<PathBuf>,
    stdout: Option<PathBuf>,
    timeout: Duration,
    secrets: Vec<String>,
}

impl CommandSpec {
    /// Construct new command with a time limit.
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            stdin: None,
            stdout: None,
            timeout,
            secrets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set environment variable for the child only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Feed file contents to standard input.
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Stream standard output into file instead of capturing it.
    pub fn stdout_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// Replace time limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Mask value whenever the command is displayed.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    pub fn env_list(&self) -> &[(String, String)] {
        &self.envs
    }

    pub fn stdin_path(&self) -> Option<&Path> {
        self.stdin.as_deref()
    }

    pub fn stdout_path(&self) -> Option<&Path> {
        self.stdout.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |text, secret| text.replace(secret, "***"))
    }
}

impl Display for CommandSpec {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        fmt.write_str(self.redact(&line).as_str())
    }
}

/// Layer of indirection for running external programs.
#[allow(async_fn_in_trait)]
pub trait Process {
    /// Run command to completion.
    ///
    /// Returns captured standard output with trailing newline chomped, or an
    /// empty string when output was redirected into a file.
    async fn run(&self, command: &CommandSpec) -> Result<String>;
}

/// Process execution through tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcess;

impl Process for TokioProcess {
    #[instrument(skip(self, command), fields(command = %command), level = "debug")]
    async fn run(&self, command: &CommandSpec) -> Result<String> {
        debug!("run with timeout {:?}", command.timeout);
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k, v)))
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match &command.stdin {
            Some(path) => {
                let file = File::open(path).map_err(|source| ProcessError::Redirect {
                    source,
                    path: path.clone(),
                })?;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        match &command.stdout {
            Some(path) => {
                let file = File::create(path).map_err(|source| ProcessError::Redirect {
                    source,
                    path: path.clone(),
                })?;
                cmd.stdout(Stdio::from(file));
            }
            None => {
                cmd.stdout(Stdio::piped());
            }
        }

        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            source,
            command: command.to_string(),
        })?;

        let output = tokio::time::timeout(command.timeout, child.wait_with_output())
            .await
            .map_err(|_| ProcessError::Timeout {
                command: command.to_string(),
                after: command.timeout,
            })?
            .map_err(|source| ProcessError::Spawn {
                source,
                command: command.to_string(),
            })?;

        let stdout = chomp(String::from_utf8_lossy(output.stdout.as_slice()).into_owned());
        let stderr = chomp(String::from_utf8_lossy(output.stderr.as_slice()).into_owned());

        if !output.status.success() {
            return Err(ProcessError::Failed {
                command: command.to_string(),
                code: output.status.code(),
                stderr: command.redact(&stderr),
            });
        }

        Ok(stdout)
    }
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// External process failure.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Program could not be started or awaited.
    #[error("failed to run {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Standard stream could not be redirected to file.
    #[error("failed to redirect stream through {path:?}")]
    Redirect {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Program did not finish in time.
    #[error("command {command:?} timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    /// Program exited unsuccessfully.
    #[error("command {command:?} failed (exit code {code:?}):\n{stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl ProcessError {
    /// Check whether a failed command complained with the given text.
    ///
    /// Used to tell "already exists" or "not found" apart from real failures.
    pub fn stderr_contains(&self, needle: &str) -> bool {
        match self {
            Self::Failed { stderr, .. } => stderr
                .to_ascii_lowercase()
                .contains(needle.to_ascii_lowercase().as_str()),
            _ => false,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = ProcessError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_redacts_secrets() {
        let command = CommandSpec::new("docker", Duration::from_secs(1))
            .args(["exec", "mysql", "mysql", "-ppassw0rd"])
            .secret("passw0rd");
        assert_eq!(command.to_string(), "docker exec mysql mysql -p***");
    }

    #[test]
    fn empty_secret_is_ignored() {
        let command = CommandSpec::new("echo", Duration::from_secs(1))
            .arg("hello")
            .secret("");
        assert_eq!(command.to_string(), "echo hello");
    }

    #[test]
    fn stderr_contains_ignores_case() {
        let error = ProcessError::Failed {
            command: "docker network create x".into(),
            code: Some(1),
            stderr: "Error response from daemon: network with name x already exists".into(),
        };
        assert!(error.stderr_contains("Already Exists"));
        assert!(!error.stderr_contains("not found"));
    }

    #[tokio::test]
    async fn run_captures_stdout() -> anyhow::Result<()> {
        let command = CommandSpec::new("echo", Duration::from_secs(5)).arg("hello");
        let output = TokioProcess.run(&command).await?;
        assert_eq!(output, "hello");

        Ok(())
    }

    #[tokio::test]
    async fn run_streams_stdout_into_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.txt");
        let command = CommandSpec::new("echo", Duration::from_secs(5))
            .arg("dumped")
            .stdout_file(&path);
        let output = TokioProcess.run(&command).await?;
        assert_eq!(output, "");
        assert_eq!(std::fs::read_to_string(&path)?, "dumped\n");

        Ok(())
    }

    #[tokio::test]
    async fn run_reports_failure() {
        let command = CommandSpec::new("sh", Duration::from_secs(5))
            .args(["-c", "echo nope >&2; exit 3"]);
        let result = TokioProcess.run(&command).await;
        assert!(matches!(result, Err(ProcessError::Failed { code: Some(3), .. })));
        assert!(result.unwrap_err().stderr_contains("nope"));
    }

    #[tokio::test]
    async fn run_times_out() {
        let command = CommandSpec::new("sleep", Duration::from_millis(50)).arg("5");
        let result = TokioProcess.run(&command).await;
        assert!(matches!(result, Err(ProcessError::Timeout { .. })));
    }

    #[tokio::test]
    async fn run_missing_program() {
        let command = CommandSpec::new("nonexistent_command_12345", Duration::from_secs(5));
        let result = TokioProcess.run(&command).await;
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }
}
