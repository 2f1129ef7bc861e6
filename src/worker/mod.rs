//! The worker's primary flow: start delay, discovery, code base, then one job at a time.

pub mod acquisition;

pub use acquisition::{Acquired, JobAcquisition, DEFAULT_RETRY_PAUSE};

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::codebase::CodeBase;
use crate::config::WorkerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ErrorCode, Result, WorkerError};
use crate::job::{JobPipeline, ResultReporter, DEFAULT_MONITOR_INTERVAL};
use crate::services::{discover, ExperimentManagerClient, StorageManagerClient};
use crate::subprocess::SubprocessManager;

/// How a run ended when no fatal error occurred
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub jobs_completed: u32,
}

pub struct Worker {
    config: WorkerConfig,
    root: PathBuf,
    dispatcher: Dispatcher,
    subprocess: SubprocessManager,
    monitor_interval: Duration,
    retry_pause: Duration,
}

impl Worker {
    /// Production worker speaking HTTP(S) and running real adapter processes
    pub fn new(config: WorkerConfig, root: PathBuf) -> Result<Self> {
        let dispatcher = Dispatcher::from_config(&config)?;
        Ok(Self::with_parts(
            config,
            root,
            dispatcher,
            SubprocessManager::production(),
        ))
    }

    pub fn with_parts(
        config: WorkerConfig,
        root: PathBuf,
        dispatcher: Dispatcher,
        subprocess: SubprocessManager,
    ) -> Self {
        Self {
            config,
            root,
            dispatcher,
            subprocess,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            retry_pause: DEFAULT_RETRY_PAUSE,
        }
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// Work until the experiment has nothing left to run.
    ///
    /// Every error is fatal; the caller maps it to a process exit code.
    pub async fn run(&self) -> Result<RunSummary> {
        tracing::info!("Working directory: {}", self.root.display());
        wait_for_start(self.config.start_time()).await;

        let timeout = self.config.communication_timeout();
        let directory = discover(
            &self.dispatcher,
            &self.config.information_service_url,
            timeout,
        )
        .await?;

        let experiment_dir = self.config.experiment_dir(&self.root);
        tokio::fs::create_dir_all(&experiment_dir).await.map_err(|e| {
            WorkerError::io_with_code(
                ErrorCode::IO_CREATE_DIR,
                "Cannot create experiment directory",
                Some(experiment_dir.clone()),
            )
            .with_source(e)
        })?;

        let coordinators = ExperimentManagerClient::new(
            self.dispatcher.clone(),
            directory.experiment_managers,
            self.config.experiment_id.clone(),
            timeout,
        );
        let storage = StorageManagerClient::new(
            self.dispatcher.clone(),
            directory.storage_managers,
            self.config.experiment_id.clone(),
            timeout,
        );

        let code_base = CodeBase::in_experiment(&experiment_dir);
        code_base.install(&coordinators).await?;

        let pipeline = JobPipeline::new(
            self.subprocess.runner(),
            code_base,
            experiment_dir,
            coordinators.clone(),
            ResultReporter::new(coordinators.clone(), storage),
        )
        .with_monitor_interval(self.monitor_interval);
        let acquisition = JobAcquisition::new(&coordinators).with_retry_pause(self.retry_pause);

        let mut summary = RunSummary { jobs_completed: 0 };
        let mut cleanups: Vec<JoinHandle<()>> = Vec::new();

        let finished = loop {
            let job = match acquisition.acquire().await {
                Ok(Acquired::Job(job)) => job,
                Ok(Acquired::AllSent) => break Ok(()),
                Err(e) => break Err(e),
            };

            let outcome = pipeline.run(job).await?;
            summary.jobs_completed += 1;
            tracing::info!(
                "Simulation run {} finished with status {}",
                outcome.job_id,
                outcome.result.status.as_str()
            );

            cleanups.retain(|cleanup| !cleanup.is_finished());
            cleanups.push(outcome.cleanup);
        };

        for cleanup in cleanups {
            if let Err(e) = cleanup.await {
                tracing::warn!("Directory cleanup did not complete: {}", e);
            }
        }

        finished.map(|()| summary)
    }
}

/// Sleep until `start_at`; a time in the past does not delay anything
async fn wait_for_start(start_at: Option<DateTime<Utc>>) {
    let Some(start_at) = start_at else {
        return;
    };

    match (start_at - Utc::now()).to_std() {
        Ok(delay) if !delay.is_zero() => {
            tracing::info!("We have start_at provided, sleeping {:?}", delay);
            tokio::time::sleep(delay).await;
            tracing::info!("We are ready to work");
        }
        _ => tracing::debug!("start_at {} already passed", start_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_start_in_future() {
        let started = Instant::now();
        wait_for_start(Some(Utc::now() + chrono::Duration::seconds(30))).await;
        assert!(started.elapsed() >= Duration::from_secs(29));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_start_in_past_or_unset() {
        let started = Instant::now();
        wait_for_start(Some(Utc::now() - chrono::Duration::seconds(30))).await;
        wait_for_start(None).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
