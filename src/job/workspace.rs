use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

use crate::error::{ErrorCode, Result, WorkerError};

pub const INPUT_FILE: &str = "input.json";
pub const INTERMEDIATE_RESULT_FILE: &str = "intermediate_result.json";
pub const OUTPUT_FILE: &str = "output.json";
pub const OUTPUT_ARCHIVE_FILE: &str = "output.tar.gz";
pub const STDOUT_FILE: &str = "_stdout.txt";

/// Number of log lines attached to fatal adapter failures
pub const LOG_TAIL_LINES: usize = 100;

/// Per-job directory `<experiment dir>/simulation_<job_id>`.
///
/// Every adapter runs with this directory as its working directory; nothing relies on the
/// process-wide current directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobWorkingDirectory {
    job_id: u64,
    path: PathBuf,
}

impl JobWorkingDirectory {
    pub fn new(experiment_dir: &Path, job_id: u64) -> Self {
        Self {
            job_id,
            path: experiment_dir.join(format!("simulation_{}", job_id)),
        }
    }

    /// Create the directory and write `input.json`
    pub async fn prepare(&self, input_parameters: &Map<String, Value>) -> Result<()> {
        tokio::fs::create_dir_all(&self.path).await.map_err(|e| {
            WorkerError::io_with_code(
                ErrorCode::IO_CREATE_DIR,
                "Cannot create simulation directory",
                Some(self.path.clone()),
            )
            .with_source(e)
        })?;

        let input = serde_json::to_vec(input_parameters).map_err(|e| {
            WorkerError::io_with_code(
                ErrorCode::IO_WRITE,
                "Cannot encode input parameters",
                Some(self.input_file()),
            )
            .with_source(e)
        })?;

        tokio::fs::write(self.input_file(), input).await.map_err(|e| {
            WorkerError::io_with_code(
                ErrorCode::IO_WRITE,
                "Cannot write input parameters",
                Some(self.input_file()),
            )
            .with_source(e)
        })?;

        tracing::debug!("Prepared {}", self.path.display());
        Ok(())
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn input_file(&self) -> PathBuf {
        self.path.join(INPUT_FILE)
    }

    pub fn intermediate_result_file(&self) -> PathBuf {
        self.path.join(INTERMEDIATE_RESULT_FILE)
    }

    pub fn output_file(&self) -> PathBuf {
        self.path.join(OUTPUT_FILE)
    }

    pub fn output_archive(&self) -> PathBuf {
        self.path.join(OUTPUT_ARCHIVE_FILE)
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.path.join(STDOUT_FILE)
    }

    /// Last `LOG_TAIL_LINES` lines of `_stdout.txt`, empty when there is no log
    pub async fn log_tail(&self) -> String {
        match tokio::fs::read(self.stdout_log()).await {
            Ok(content) => tail_lines(&String::from_utf8_lossy(&content), LOG_TAIL_LINES),
            Err(_) => String::new(),
        }
    }

    /// Remove the directory in the background.
    ///
    /// Only call this once the job's progress monitor has acknowledged its stop.
    pub fn schedule_cleanup(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            match tokio::fs::remove_dir_all(&self.path).await {
                Ok(()) => tracing::debug!("Removed {}", self.path.display()),
                Err(e) => tracing::warn!("Could not remove {}: {}", self.path.display(), e),
            }
        })
    }
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
