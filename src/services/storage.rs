use std::time::Duration;

use crate::dispatch::{Dispatcher, EndpointPool, RequestSpec};
use crate::error::Result;
use crate::job::workspace::{OUTPUT_ARCHIVE_FILE, STDOUT_FILE};

/// Client for the storage manager role, which keeps binary artifacts of finished runs
#[derive(Clone)]
pub struct StorageManagerClient {
    dispatcher: Dispatcher,
    pool: EndpointPool,
    experiment_id: String,
    timeout: Duration,
}

impl StorageManagerClient {
    pub fn new(
        dispatcher: Dispatcher,
        pool: EndpointPool,
        experiment_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            pool,
            experiment_id: experiment_id.into(),
            timeout,
        }
    }

    pub async fn upload_output_archive(&self, job_id: u64, content: Vec<u8>) -> Result<Vec<u8>> {
        let path = format!("experiments/{}/simulations/{}", self.experiment_id, job_id);
        self.upload(path, OUTPUT_ARCHIVE_FILE, content).await
    }

    pub async fn upload_stdout(&self, job_id: u64, content: Vec<u8>) -> Result<Vec<u8>> {
        let path = format!(
            "experiments/{}/simulations/{}/stdout",
            self.experiment_id, job_id
        );
        self.upload(path, STDOUT_FILE, content).await
    }

    async fn upload(&self, path: String, file_name: &str, content: Vec<u8>) -> Result<Vec<u8>> {
        tracing::info!("Uploading '{}' ({} bytes)", file_name, content.len());
        self.dispatcher
            .dispatch(
                &RequestSpec::put_file(path, file_name, content),
                &self.pool,
                self.timeout,
            )
            .await
    }
}
