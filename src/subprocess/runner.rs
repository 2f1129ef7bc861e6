use async_trait::async_trait;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use super::error::ProcessError;

/// errno returned by execve for files without a recognised binary format or shebang
const ENOEXEC: i32 = 8;

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Append combined stdout and stderr to this file; without one, output is discarded
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
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
            _ => None,
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitStatus::Success => write!(f, "exit status 0"),
            ExitStatus::Error(code) => write!(f, "exit status {}", code),
            ExitStatus::Signal(signal) => write!(f, "terminated by signal {}", signal),
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

/// Runs commands as tokio child processes.
///
/// Children are killed when the future driving them is dropped, so a caller that abandons a
/// `run` (for instance inside `tokio::select!`) does not leak a running adapter.
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    /// Log command execution details
    fn log_command_start(command: &ProcessCommand) {
        tracing::debug!(
            "Executing subprocess: {} {}",
            command.program,
            command.args.join(" ")
        );

        if let Some(ref dir) = command.working_dir {
            tracing::trace!("Working directory: {:?}", dir);
        }

        if let Some(ref log) = command.log_file {
            tracing::trace!("Appending output to: {:?}", log);
        }
    }

    /// Configure the command with working directory and stdio
    fn configure_command(
        program: &str,
        args: &[String],
        command: &ProcessCommand,
    ) -> Result<tokio::process::Command, ProcessError> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        cmd.kill_on_drop(true);

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        Self::configure_stdio(&mut cmd, command)?;
        Ok(cmd)
    }

    /// Route output into the append-only log file
    fn configure_stdio(
        cmd: &mut tokio::process::Command,
        command: &ProcessCommand,
    ) -> Result<(), ProcessError> {
        cmd.stdin(Stdio::null());

        match &command.log_file {
            Some(path) => {
                let stdout = Self::open_log(path)?;
                let stderr = stdout.try_clone().map_err(|e| ProcessError::LogFile {
                    path: path.display().to_string(),
                    source: e,
                })?;
                cmd.stdout(Stdio::from(stdout));
                cmd.stderr(Stdio::from(stderr));
            }
            None => {
                cmd.stdout(Stdio::null());
                cmd.stderr(Stdio::null());
            }
        }
        Ok(())
    }

    fn open_log(path: &Path) -> Result<std::fs::File, ProcessError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProcessError::LogFile {
                path: path.display().to_string(),
                source: e,
            })
    }

    /// Spawn the program, falling back to `sh` for scripts without a shebang line
    fn spawn(command: &ProcessCommand) -> Result<tokio::process::Child, ProcessError> {
        let mut cmd = Self::configure_command(&command.program, &command.args, command)?;
        match cmd.spawn() {
            Ok(child) => Ok(child),
            Err(e) if e.raw_os_error() == Some(ENOEXEC) => {
                tracing::debug!(
                    "'{}' is not directly executable, running it through sh",
                    command.program
                );
                let mut args = vec![command.program.clone()];
                args.extend(command.args.iter().cloned());
                let mut cmd = Self::configure_command("sh", &args, command)?;
                cmd.spawn()
                    .map_err(|e| Self::map_spawn_error(e, &command.program, &command.args))
            }
            Err(e) => Err(Self::map_spawn_error(e, &command.program, &command.args)),
        }
    }

    /// Convert process exit status to our ExitStatus enum
    fn parse_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            ExitStatus::Success
        } else if let Some(code) = status.code() {
            ExitStatus::Error(code)
        } else {
            Self::parse_signal_status(status)
        }
    }

    /// Parse signal status on Unix systems
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

    /// Log the process execution result
    fn log_result(result: &ProcessOutput, command: &ProcessCommand) {
        let command_str = format!("{} {}", command.program, command.args.join(" "));

        match &result.status {
            ExitStatus::Success => {
                tracing::debug!(
                    "Subprocess completed successfully in {:?}: {}",
                    result.duration,
                    command_str
                );
            }
            ExitStatus::Error(code) => {
                tracing::debug!(
                    "Subprocess failed with exit code {} in {:?}: {}",
                    code,
                    result.duration,
                    command_str
                );
            }
            ExitStatus::Signal(signal) => {
                tracing::warn!(
                    "Subprocess terminated by signal {} in {:?}: {}",
                    signal,
                    result.duration,
                    command_str
                );
            }
        }
    }

    /// Map spawn error to ProcessError
    fn map_spawn_error(error: std::io::Error, program: &str, args: &[String]) -> ProcessError {
        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(program.to_string())
        } else {
            ProcessError::SpawnFailed {
                command: format!("{} {}", program, args.join(" ")),
                source: error,
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let start = std::time::Instant::now();

        Self::log_command_start(&command);

        let mut child = Self::spawn(&command)?;
        let status = child.wait().await?;

        let result = ProcessOutput {
            status: Self::parse_exit_status(status),
            duration: start.elapsed(),
        };

        Self::log_result(&result, &command);

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_exit_status() {
        use std::os::unix::process::ExitStatusExt;

        let status = std::process::ExitStatus::from_raw(0);
        assert_eq!(
            TokioProcessRunner::parse_exit_status(status),
            ExitStatus::Success
        );

        // Exit code 1
        let status = std::process::ExitStatus::from_raw(256);
        assert_eq!(
            TokioProcessRunner::parse_exit_status(status),
            ExitStatus::Error(1)
        );

        // SIGKILL
        let status = std::process::ExitStatus::from_raw(9);
        assert_eq!(
            TokioProcessRunner::parse_exit_status(status),
            ExitStatus::Signal(9)
        );
    }

    #[test]
    fn test_exit_status_display() {
        assert_eq!(ExitStatus::Error(3).to_string(), "exit status 3");
        assert_eq!(ExitStatus::Signal(15).to_string(), "terminated by signal 15");
        assert_eq!(ExitStatus::Success.code(), Some(0));
        assert_eq!(ExitStatus::Signal(9).code(), None);
    }

    #[test]
    fn test_map_spawn_error_not_found() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(
            TokioProcessRunner::map_spawn_error(err, "executor", &[]),
            ProcessError::CommandNotFound(ref p) if p == "executor"
        ));
    }
}
