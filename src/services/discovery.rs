use std::time::Duration;

use crate::dispatch::{Dispatcher, EndpointPool, RequestSpec};
use crate::error::{ErrorCode, Result, WorkerError};

const INFORMATION_SERVICE: &str = "information service";
const EXPERIMENT_MANAGER: &str = "experiment manager";
const STORAGE_MANAGER: &str = "storage manager";

/// Endpoint pools obtained from the information service at startup
#[derive(Debug, Clone)]
pub struct ServiceDirectory {
    pub experiment_managers: EndpointPool,
    pub storage_managers: EndpointPool,
}

/// Look up both service pools. Any failure here is fatal for the run.
pub async fn discover(
    dispatcher: &Dispatcher,
    information_service_url: &str,
    timeout: Duration,
) -> Result<ServiceDirectory> {
    let information_service = EndpointPool::single(INFORMATION_SERVICE, information_service_url);

    let experiment_managers = fetch_pool(
        dispatcher,
        &information_service,
        "experiment_managers",
        EXPERIMENT_MANAGER,
        timeout,
    )
    .await?;
    let storage_managers = fetch_pool(
        dispatcher,
        &information_service,
        "storage_managers",
        STORAGE_MANAGER,
        timeout,
    )
    .await?;

    tracing::info!(
        "Discovered {} experiment manager(s) and {} storage manager(s)",
        experiment_managers.len(),
        storage_managers.len()
    );

    Ok(ServiceDirectory {
        experiment_managers,
        storage_managers,
    })
}

async fn fetch_pool(
    dispatcher: &Dispatcher,
    information_service: &EndpointPool,
    path: &str,
    role: &str,
    timeout: Duration,
) -> Result<EndpointPool> {
    let body = dispatcher
        .dispatch(&RequestSpec::get(path), information_service, timeout)
        .await?;
    tracing::debug!("Response body: {}", String::from_utf8_lossy(&body));

    let hosts: Vec<String> = serde_json::from_slice(&body).map_err(|e| {
        WorkerError::service_with_code(
            ErrorCode::SERVICE_INVALID_RESPONSE,
            format!("Cannot decode the list of {} addresses", role),
            Some(INFORMATION_SERVICE.to_string()),
        )
        .with_source(e)
    })?;

    if hosts.is_empty() {
        return Err(WorkerError::service_with_code(
            ErrorCode::SERVICE_NO_ENDPOINTS,
            format!("There is no {} registered in the information service", role),
            Some(INFORMATION_SERVICE.to_string()),
        ));
    }

    EndpointPool::new(role, hosts)
}
