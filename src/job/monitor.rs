//! Background progress monitoring for a running job.
//!
//! The monitor repeatedly runs the `progress_monitor` adapter, reads
//! `intermediate_result.json` and forwards successful intermediate results to the coordinators.
//! It stops cooperatively: the stop request is observed once per iteration (or while sleeping
//! between iterations), never in the middle of an adapter run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::adapter::run_adapter;
use super::result::read_result_file;
use super::workspace::JobWorkingDirectory;
use crate::codebase::AdapterKind;
use crate::error::{ErrorCode, Result, WorkerError};
use crate::services::ExperimentManagerClient;
use crate::subprocess::ProcessRunner;

/// Pause between two monitor iterations
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// What the monitor did before acknowledging its stop
#[derive(Debug, Clone, Default)]
pub struct MonitorSummary {
    pub iterations: u32,
    pub reports: u32,
    /// When the monitor returned; nothing is reported after this instant
    pub stopped_at: Option<Instant>,
}

pub struct ProgressMonitor {
    runner: Arc<dyn ProcessRunner>,
    adapter: PathBuf,
    workspace: JobWorkingDirectory,
    coordinators: ExperimentManagerClient,
    interval: Duration,
}

impl ProgressMonitor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        adapter: PathBuf,
        workspace: JobWorkingDirectory,
        coordinators: ExperimentManagerClient,
        interval: Duration,
    ) -> Self {
        Self {
            runner,
            adapter,
            workspace,
            coordinators,
            interval,
        }
    }

    /// Start the monitor in the background
    pub fn spawn(self) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        MonitorHandle::new(cancel, task)
    }

    /// Handle for a job whose code base has no monitor adapter
    pub fn disabled() -> MonitorHandle {
        tracing::info!("There is no progress monitor script");
        let task = tokio::spawn(async {
            Ok(MonitorSummary {
                stopped_at: Some(Instant::now()),
                ..MonitorSummary::default()
            })
        });
        MonitorHandle::new(CancellationToken::new(), task)
    }

    async fn run(self, cancel: CancellationToken) -> Result<MonitorSummary> {
        let mut summary = MonitorSummary::default();

        loop {
            summary.iterations += 1;

            run_adapter(
                self.runner.as_ref(),
                AdapterKind::ProgressMonitor,
                &self.adapter,
                &self.workspace,
                &[],
            )
            .await?;

            let progress = read_result_file(&self.workspace.intermediate_result_file()).await;
            if progress.is_ok() {
                tracing::info!("[progress_info] Results: {}", progress.results);
                match self
                    .coordinators
                    .report_progress(self.workspace.job_id(), &progress)
                    .await
                {
                    Ok(body) => {
                        summary.reports += 1;
                        tracing::debug!(
                            "[progress_info] Response body: {}",
                            String::from_utf8_lossy(&body)
                        );
                    }
                    Err(e) => tracing::warn!("[progress_info] Could not report progress: {}", e),
                }
            } else {
                tracing::debug!("[progress_info] Nothing to report: {}", progress.reason);
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }

            if cancel.is_cancelled() {
                break;
            }
        }

        tracing::info!("[progress_info] Our work is finished");
        summary.stopped_at = Some(Instant::now());
        Ok(summary)
    }
}

/// Owner side of a running monitor: a stop signal plus the task's completion handle
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<MonitorSummary>>>,
    finished: Option<MonitorSummary>,
}

impl MonitorHandle {
    fn new(cancel: CancellationToken, task: JoinHandle<Result<MonitorSummary>>) -> Self {
        Self {
            cancel,
            task: Some(task),
            finished: None,
        }
    }

    /// Resolves only if the monitor fails; pends forever once it has ended successfully.
    ///
    /// Cancel safe. After it has yielded an error, `stop_and_wait` has nothing left to await.
    pub async fn failure(&mut self) -> WorkerError {
        if let Some(task) = self.task.as_mut() {
            let outcome = flatten(task.await);
            self.task = None;
            match outcome {
                Ok(summary) => self.finished = Some(summary),
                Err(e) => return e,
            }
        }
        std::future::pending().await
    }

    /// Request a stop and wait for the monitor to acknowledge it
    pub async fn stop_and_wait(mut self) -> Result<MonitorSummary> {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => flatten(task.await),
            None => Ok(self.finished.take().unwrap_or_default()),
        }
    }
}

fn flatten(
    joined: std::result::Result<Result<MonitorSummary>, tokio::task::JoinError>,
) -> Result<MonitorSummary> {
    joined.map_err(|e| {
        WorkerError::adapter_with_code(
            ErrorCode::EXEC_MONITOR_FAILED,
            "Progress monitor task did not complete",
            Some(AdapterKind::ProgressMonitor.to_string()),
        )
        .with_source(e)
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Credentials, Dispatcher, EndpointPool, MockTransport};
    use crate::subprocess::MockProcessRunner;
    use serde_json::Map;
    use tempfile::TempDir;

    const PROGRESS_PATH: &str = "experiments/e/simulations/1/progress_info";

    async fn setup(root: &TempDir) -> (JobWorkingDirectory, ExperimentManagerClient, MockTransport) {
        let workspace = JobWorkingDirectory::new(root.path(), 1);
        workspace.prepare(&Map::new()).await.unwrap();
        let transport = MockTransport::new();
        transport.respond(PROGRESS_PATH, "{}");
        let client = ExperimentManagerClient::new(
            Dispatcher::new(Arc::new(transport.clone()), "http", Credentials::default()),
            EndpointPool::single("experiment manager", "em:1"),
            "e",
            Duration::from_secs(5),
        );
        (workspace, client, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_monitor_acknowledges_immediately() {
        let summary = ProgressMonitor::disabled().stop_and_wait().await.unwrap();
        assert_eq!(summary.iterations, 0);
        assert!(summary.stopped_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_ok_progress_until_stopped() {
        let root = TempDir::new().unwrap();
        let (workspace, client, transport) = setup(&root).await;

        let mut mock = MockProcessRunner::new();
        mock.expect_command("/cb/progress_monitor")
            .creates_file("intermediate_result.json", r#"{"status":"ok","results":{"p":0.5}}"#)
            .finish();

        let handle = ProgressMonitor::new(
            Arc::new(mock.clone()),
            PathBuf::from("/cb/progress_monitor"),
            workspace,
            client,
            DEFAULT_MONITOR_INTERVAL,
        )
        .spawn();

        tokio::time::sleep(Duration::from_secs(25)).await;
        let summary = handle.stop_and_wait().await.unwrap();

        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.reports, 3);
        let stopped_at = summary.stopped_at.unwrap();
        let reports = transport.requests_to(PROGRESS_PATH);
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.at <= stopped_at));
        assert!(mock.verify_called("/cb/progress_monitor", 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_intermediate_result_is_not_reported() {
        let root = TempDir::new().unwrap();
        let (workspace, client, transport) = setup(&root).await;

        let mut mock = MockProcessRunner::new();
        mock.expect_command("/cb/progress_monitor").finish();

        let handle = ProgressMonitor::new(
            Arc::new(mock),
            PathBuf::from("/cb/progress_monitor"),
            workspace,
            client,
            DEFAULT_MONITOR_INTERVAL,
        )
        .spawn();

        tokio::time::sleep(Duration::from_secs(5)).await;
        let summary = handle.stop_and_wait().await.unwrap();

        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.reports, 0);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_adapter_failure_surfaces_through_failure() {
        let root = TempDir::new().unwrap();
        let (workspace, client, _transport) = setup(&root).await;

        let mut mock = MockProcessRunner::new();
        mock.expect_command("/cb/progress_monitor")
            .returns_exit_code(3)
            .finish();

        let mut handle = ProgressMonitor::new(
            Arc::new(mock),
            PathBuf::from("/cb/progress_monitor"),
            workspace,
            client,
            DEFAULT_MONITOR_INTERVAL,
        )
        .spawn();

        let err = handle.failure().await;
        assert_eq!(err.code(), ErrorCode::EXEC_SUBPROCESS_FAILED);
        assert!(err.user_message().contains("progress_monitor"));
        assert!(handle.stop_and_wait().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_pends_after_clean_stop() {
        let mut handle = ProgressMonitor::disabled();
        let waited =
            tokio::time::timeout(Duration::from_secs(60), handle.failure()).await;
        assert!(waited.is_err());
        assert_eq!(handle.stop_and_wait().await.unwrap().iterations, 0);
    }
}
