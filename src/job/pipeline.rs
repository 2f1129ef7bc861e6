use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::adapter::run_adapter;
use super::monitor::{MonitorSummary, ProgressMonitor, DEFAULT_MONITOR_INTERVAL};
use super::reporter::ResultReporter;
use super::result::{read_result_file, SimulationRunResult};
use super::workspace::{JobWorkingDirectory, INPUT_FILE};
use crate::codebase::{AdapterKind, CodeBase};
use crate::error::{ErrorCode, Result, WorkerError};
use crate::services::{ExperimentManagerClient, SimulationJob};
use crate::subprocess::ProcessRunner;

/// Everything observable about a job that went through the whole pipeline
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: u64,
    pub result: SimulationRunResult,
    pub monitor: MonitorSummary,
    /// Background removal of the job directory
    pub cleanup: JoinHandle<()>,
}

/// Drives one job through input transform, execution, output transform and reporting
pub struct JobPipeline {
    runner: Arc<dyn ProcessRunner>,
    code_base: CodeBase,
    experiment_dir: PathBuf,
    coordinators: ExperimentManagerClient,
    reporter: ResultReporter,
    monitor_interval: Duration,
}

impl JobPipeline {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        code_base: CodeBase,
        experiment_dir: PathBuf,
        coordinators: ExperimentManagerClient,
        reporter: ResultReporter,
    ) -> Self {
        Self {
            runner,
            code_base,
            experiment_dir,
            coordinators,
            reporter,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
        }
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub async fn run(&self, job: SimulationJob) -> Result<JobOutcome> {
        let span = tracing::info_span!("job", job_id = job.job_id);
        self.run_job(job).instrument(span).await
    }

    async fn run_job(&self, job: SimulationJob) -> Result<JobOutcome> {
        tracing::info!("Simulation index: {}", job.job_id);
        tracing::info!(
            "Simulation execution constraints: {}",
            job.execution_constraints
        );

        let workspace = JobWorkingDirectory::new(&self.experiment_dir, job.job_id);
        workspace.prepare(&job.input_parameters).await?;
        tracing::info!("Working dir: {}", workspace.path().display());

        if let Some(input_writer) = self.code_base.adapter(AdapterKind::InputWriter) {
            run_adapter(
                self.runner.as_ref(),
                AdapterKind::InputWriter,
                &input_writer,
                &workspace,
                &[INPUT_FILE],
            )
            .await?;
        }

        let monitor = self.execute(&workspace).await?;

        if let Some(output_reader) = self.code_base.adapter(AdapterKind::OutputReader) {
            run_adapter(
                self.runner.as_ref(),
                AdapterKind::OutputReader,
                &output_reader,
                &workspace,
                &[],
            )
            .await?;
        }

        let result = read_result_file(&workspace.output_file()).await;
        if !result.is_ok() {
            tracing::warn!("Simulation run failed: {}", result.reason);
        }

        self.reporter.report(&workspace, &result).await?;

        Ok(JobOutcome {
            job_id: job.job_id,
            result,
            monitor,
            cleanup: workspace.schedule_cleanup(),
        })
    }

    /// Run the executor with the progress monitor alongside.
    ///
    /// Returns only after the monitor has acknowledged its stop, whatever the executor did.
    async fn execute(&self, workspace: &JobWorkingDirectory) -> Result<MonitorSummary> {
        let mut monitor = match self.code_base.adapter(AdapterKind::ProgressMonitor) {
            Some(adapter) => ProgressMonitor::new(
                Arc::clone(&self.runner),
                adapter,
                workspace.clone(),
                self.coordinators.clone(),
                self.monitor_interval,
            )
            .spawn(),
            None => ProgressMonitor::disabled(),
        };

        let executed = match self.code_base.adapter(AdapterKind::Executor) {
            Some(executor) => {
                tokio::select! {
                    result = run_adapter(
                        self.runner.as_ref(),
                        AdapterKind::Executor,
                        &executor,
                        workspace,
                        &[],
                    ) => result,
                    error = monitor.failure() => {
                        tracing::error!("Progress monitor failed, aborting the executor");
                        Err(error)
                    }
                }
            }
            None => Err(WorkerError::adapter_with_code(
                ErrorCode::EXEC_COMMAND_NOT_FOUND,
                format!(
                    "The code base in {} has no executor",
                    self.code_base.dir().display()
                ),
                Some(AdapterKind::Executor.to_string()),
            )),
        };

        let stopped = monitor.stop_and_wait().await;
        let summary = match (executed, stopped) {
            (Err(e), _) => return Err(e),
            (Ok(()), Err(e)) => return Err(e),
            (Ok(()), Ok(summary)) => summary,
        };

        tracing::debug!(
            "Progress monitor stopped after {} iteration(s), {} report(s)",
            summary.iterations,
            summary.reports
        );
        Ok(summary)
    }
}
