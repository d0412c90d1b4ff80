use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout};

use super::error::ProcessError;

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Keys in `env` whose values are credentials.
    pub secret_env: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            ExitStatus::Signal(_) => None,
        }
    }
}

/// A spawned external tool with both output streams piped.
///
/// The child runs in its own process group so that termination reaches any
/// helpers it forks. Dropping the handle kills the child.
pub struct ToolProcess {
    child: Child,
    pid: Option<u32>,
    command: String,
}

impl ToolProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn take_stdout(&mut self) -> Result<ChildStdout, ProcessError> {
        self.child
            .stdout
            .take()
            .ok_or(ProcessError::MissingPipe("stdout"))
    }

    pub fn take_stderr(&mut self) -> Result<ChildStderr, ProcessError> {
        self.child
            .stderr
            .take()
            .ok_or(ProcessError::MissingPipe("stderr"))
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus, ProcessError> {
        let status = self.child.wait().await?;
        let status = parse_exit_status(status);
        match status {
            ExitStatus::Success => {
                tracing::debug!("Subprocess completed successfully: {}", self.command)
            }
            ExitStatus::Error(code) => {
                tracing::debug!("Subprocess exited with code {}: {}", code, self.command)
            }
            ExitStatus::Signal(signal) => {
                tracing::warn!("Subprocess terminated by signal {}: {}", signal, self.command)
            }
        }
        Ok(status)
    }

    /// Terminate the process group: SIGTERM, then SIGKILL once `grace` elapses.
    pub async fn terminate(&mut self, grace: Duration) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }

        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                use nix::sys::signal::Signal;

                if let Err(e) = signal_group(pid, Signal::SIGTERM) {
                    tracing::warn!("{}", e);
                }

                match tokio::time::timeout(grace, self.child.wait()).await {
                    Ok(Ok(status)) => {
                        tracing::debug!(
                            "Subprocess exited after SIGTERM ({:?}): {}",
                            parse_exit_status(status),
                            self.command
                        );
                        return;
                    }
                    Ok(Err(e)) => tracing::warn!("Failed to wait for terminated subprocess: {}", e),
                    Err(_) => tracing::warn!(
                        "Subprocess did not exit within {:?} of SIGTERM, killing: {}",
                        grace,
                        self.command
                    ),
                }

                let _ = signal_group(pid, Signal::SIGKILL);
            }
        }

        if let Err(e) = self.child.kill().await {
            tracing::debug!("Kill after termination failed: {}", e);
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> Result<(), ProcessError> {
    use nix::unistd::Pid;

    let pgid = pid as i32;
    nix::sys::signal::killpg(Pid::from_raw(pgid), signal)
        .map_err(|source| ProcessError::Signal { pgid, source })
}

/// Convert process exit status to our ExitStatus enum
fn parse_exit_status(status: std::process::ExitStatus) -> ExitStatus {
    if status.success() {
        ExitStatus::Success
    } else if let Some(code) = status.code() {
        ExitStatus::Error(code)
    } else {
        parse_signal_status(status)
    }
}

#[cfg(unix)]
fn parse_signal_status(status: std::process::ExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
        ExitStatus::Signal(signal)
    } else {
        ExitStatus::Error(1)
    }
}

#[cfg(not(unix))]
fn parse_signal_status(_status: std::process::ExitStatus) -> ExitStatus {
    ExitStatus::Error(1)
}

/// Log command execution details without exposing secret values
fn log_command_start(command: &ProcessCommand) {
    tracing::debug!("Executing subprocess: {}", command.display());

    if !command.env.is_empty() {
        let mut keys: Vec<&str> = command.env.keys().map(String::as_str).collect();
        keys.sort_unstable();
        tracing::trace!(
            "Environment overrides ({}, {} redacted): {}",
            keys.len(),
            command.secret_env.len(),
            keys.join(", ")
        );
    }

    if let Some(ref dir) = command.working_dir {
        tracing::trace!("Working directory: {:?}", dir);
    }
}

/// Configure the command: inherited environment plus overrides, stdin closed,
/// stdout and stderr piped, own process group.
fn configure_command(command: &ProcessCommand) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(&command.program);

    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    cmd.args(&command.args);
    for (key, value) in &command.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &command.working_dir {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Map spawn error to ProcessError
fn map_spawn_error(error: std::io::Error, command: &ProcessCommand) -> ProcessError {
    if error.kind() == std::io::ErrorKind::NotFound {
        if let Ok(path) = std::env::var("PATH") {
            tracing::error!(
                "Command '{}' not found. Parent process PATH: {}",
                command.program,
                path
            );
        }
        ProcessError::CommandNotFound(command.program.clone())
    } else {
        ProcessError::SpawnFailed {
            command: command.display(),
            source: error,
        }
    }
}

/// Spawn the tool with its output streams captured.
pub fn spawn_streaming(command: &ProcessCommand) -> Result<ToolProcess, ProcessError> {
    log_command_start(command);

    let child = configure_command(command).spawn().map_err(|e| {
        tracing::error!(
            "Failed to spawn '{}': {:?} (kind: {:?})",
            command.program,
            e,
            e.kind()
        );
        map_spawn_error(e, command)
    })?;

    let pid = child.id();
    tracing::info!(pid = ?pid, "Spawned {}", command.program);

    Ok(ToolProcess {
        child,
        pid,
        command: command.display(),
    })
}
