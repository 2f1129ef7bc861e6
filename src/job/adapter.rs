use std::path::Path;

use super::workspace::JobWorkingDirectory;
use crate::codebase::AdapterKind;
use crate::error::{ErrorCode, Result, WorkerError};
use crate::subprocess::{ExitStatus, ProcessCommandBuilder, ProcessRunner};

/// Run one adapter inside the job directory, appending its output to `_stdout.txt`.
///
/// A non-zero exit, a signal or a failure to start are all fatal and carry the log tail.
pub async fn run_adapter(
    runner: &dyn ProcessRunner,
    kind: AdapterKind,
    program: &Path,
    workspace: &JobWorkingDirectory,
    args: &[&str],
) -> Result<()> {
    tracing::info!("Before {} ...", kind);

    let command = ProcessCommandBuilder::new(&program.to_string_lossy())
        .args(args.iter().copied())
        .current_dir(workspace.path())
        .append_output_to(&workspace.stdout_log())
        .build();

    let output = match runner.run(command).await {
        Ok(output) => output,
        Err(e) => {
            tracing::error!("An error occurred during '{}' execution: {}", kind, e);
            return Err(WorkerError::from(e)
                .with_context(format!("'{}' could not be run", kind))
                .with_log_tail(workspace.log_tail().await));
        }
    };

    if !output.status.success() {
        tracing::error!(
            "An error occurred during '{}' execution ({}). Please check if '{}' executes correctly on this infrastructure.",
            kind,
            output.status,
            kind
        );
        let code = match output.status {
            ExitStatus::Signal(_) => ErrorCode::EXEC_SIGNAL_RECEIVED,
            _ => ErrorCode::EXEC_SUBPROCESS_FAILED,
        };
        let mut error = WorkerError::adapter_with_code(
            code,
            format!("'{}' finished with {}", kind, output.status),
            Some(kind.to_string()),
        )
        .with_log_tail(workspace.log_tail().await);
        if let Some(code) = output.status.code() {
            error = error.with_exit_code(code);
        }
        return Err(error);
    }

    tracing::info!("After {} ({:?})", kind, output.duration);
    Ok(())
}
