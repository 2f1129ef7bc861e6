use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ErrorCode, Result, WorkerError};
use crate::services::{ExperimentManagerClient, NextSimulation, SimulationJob};

/// Pause after an unusable `next_simulation` answer
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum Acquired {
    Job(SimulationJob),
    /// The experiment has nothing left to run
    AllSent,
}

/// Asks the coordinators for work until a job is handed out
pub struct JobAcquisition<'a> {
    coordinators: &'a ExperimentManagerClient,
    retry_pause: Duration,
}

impl<'a> JobAcquisition<'a> {
    pub fn new(coordinators: &'a ExperimentManagerClient) -> Self {
        Self {
            coordinators,
            retry_pause: DEFAULT_RETRY_PAUSE,
        }
    }

    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// Budget for one acquisition sequence: one communication window per coordinator
    fn budget(&self) -> Duration {
        let coordinators = u32::try_from(self.coordinators.pool().len()).unwrap_or(u32::MAX);
        self.coordinators.timeout().saturating_mul(coordinators)
    }

    /// Obtain the next job.
    ///
    /// A `wait` answer sleeps for the advertised duration and starts a fresh sequence. Error
    /// answers are retried until the budget runs out, which ends the run with an
    /// [`WorkerError::Acquisition`] (exit code 0).
    pub async fn acquire(&self) -> Result<Acquired> {
        loop {
            let started = Instant::now();
            let budget = self.budget();

            let wait = loop {
                tracing::info!("Getting next simulation run ...");
                match self.coordinators.next_simulation().await? {
                    Ok(NextSimulation::Ready(job)) => return Ok(Acquired::Job(job)),
                    Ok(NextSimulation::AllSent) => {
                        tracing::info!("There is no more simulations to run in this experiment.");
                        return Ok(Acquired::AllSent);
                    }
                    Ok(NextSimulation::Wait(duration)) => break Some(duration),
                    Ok(NextSimulation::Failed) => {
                        tracing::warn!("An error occurred while getting next simulation.");
                    }
                    Ok(NextSimulation::Unsupported(status)) => {
                        tracing::warn!("We cannot continue due to unsupported status '{}'.", status);
                    }
                    Err(e) => tracing::warn!("Cannot decode next simulation: {}", e),
                }

                tracing::warn!("There was a problem while getting next simulation to run.");
                tokio::time::sleep(self.retry_pause).await;

                if started.elapsed() >= budget {
                    break None;
                }
            };

            match wait {
                Some(duration) => {
                    tracing::info!(
                        "There is no more simulations to run in this experiment at the moment, time to wait: {:?}",
                        duration
                    );
                    tokio::time::sleep(duration).await;
                }
                None => {
                    return Err(WorkerError::acquisition_with_code(
                        ErrorCode::ACQUISITION_TIMEOUT,
                        "Couldn't get simulation to run -> finishing work.",
                    ))
                }
            }
        }
    }
}
