use std::path::Path;

use super::result::SimulationRunResult;
use super::workspace::JobWorkingDirectory;
use crate::error::{ErrorCode, Result, WorkerError};
use crate::services::{ExperimentManagerClient, StorageManagerClient};

/// Sends the final result of a job and its artifacts back to the platform
#[derive(Clone)]
pub struct ResultReporter {
    coordinators: ExperimentManagerClient,
    storage: StorageManagerClient,
}

impl ResultReporter {
    pub fn new(coordinators: ExperimentManagerClient, storage: StorageManagerClient) -> Self {
        Self {
            coordinators,
            storage,
        }
    }

    /// Mark the run complete, then upload `output.tar.gz` and `_stdout.txt` when present
    pub async fn report(
        &self,
        workspace: &JobWorkingDirectory,
        result: &SimulationRunResult,
    ) -> Result<()> {
        let job_id = workspace.job_id();
        tracing::info!(
            "Results: status={} reason='{}' result={}",
            result.status.as_str(),
            result.reason,
            result.results
        );

        let body = self.coordinators.mark_as_complete(job_id, result).await?;
        tracing::debug!("Response body: {}", String::from_utf8_lossy(&body));

        if let Some(archive) = read_if_present(&workspace.output_archive()).await? {
            let body = self.storage.upload_output_archive(job_id, archive).await?;
            tracing::debug!("Response body: {}", String::from_utf8_lossy(&body));
        }

        if let Some(log) = read_if_present(&workspace.stdout_log()).await? {
            let body = self.storage.upload_stdout(job_id, log).await?;
            tracing::debug!("Response body: {}", String::from_utf8_lossy(&body));
        }

        Ok(())
    }
}

async fn read_if_present(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WorkerError::io_with_code(
            ErrorCode::IO_READ,
            "Cannot read artifact",
            Some(path.to_path_buf()),
        )
        .with_source(e)),
    }
}
