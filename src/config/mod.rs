//! Worker configuration, loaded once from `config.json` and immutable afterwards.

use crate::error::{ErrorCode, Result, WorkerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Per-endpoint communication window used when the file leaves `timeout` unset or non-positive
pub const DEFAULT_TIMEOUT_SECS: i64 = 60;

/// Upper bound for `timeout`: one day per endpoint
pub const MAX_TIMEOUT_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub experiment_id: String,
    pub information_service_url: String,
    #[serde(default)]
    pub experiment_manager_user: String,
    #[serde(default)]
    pub experiment_manager_pass: String,
    /// Talk plain HTTP instead of HTTPS
    #[serde(default)]
    pub development: bool,
    /// RFC 3339 timestamp before which no work is requested
    #[serde(default)]
    pub start_at: Option<String>,
    /// Seconds each endpoint is retried before failing over
    #[serde(default)]
    pub timeout: i64,
    /// PEM trust anchor for the platform's certificates
    #[serde(default)]
    pub scalarm_certificate_path: Option<PathBuf>,
    #[serde(default)]
    pub insecure_ssl: bool,
}

impl WorkerConfig {
    /// Read and validate a configuration file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            WorkerError::config_with_code(
                ErrorCode::CONFIG_NOT_FOUND,
                format!("Cannot read {}", path.display()),
            )
            .with_source(e)
        })?;

        let config = Self::from_json(&content)?;
        tracing::debug!(
            "Loaded configuration for experiment {} from {}",
            config.experiment_id,
            path.display()
        );
        Ok(config)
    }

    /// Parse configuration text and apply defaults
    pub fn from_json(content: &str) -> Result<Self> {
        let mut config: WorkerConfig = serde_json::from_str(content).map_err(|e| {
            WorkerError::config_with_code(ErrorCode::CONFIG_INVALID_JSON, "Invalid JSON syntax")
                .with_source(e)
        })?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    fn apply_defaults(&mut self) {
        if self.timeout <= 0 {
            self.timeout = DEFAULT_TIMEOUT_SECS;
        }
        if self
            .start_at
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            self.start_at = None;
        }
        if self
            .scalarm_certificate_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.scalarm_certificate_path = None;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.experiment_id.trim().is_empty() {
            return Err(WorkerError::config_with_code(
                ErrorCode::CONFIG_MISSING_REQUIRED,
                "experiment_id must not be empty",
            ));
        }
        if self.information_service_url.trim().is_empty() {
            return Err(WorkerError::config_with_code(
                ErrorCode::CONFIG_MISSING_REQUIRED,
                "information_service_url must not be empty",
            ));
        }
        if self.timeout > MAX_TIMEOUT_SECS {
            return Err(WorkerError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                format!(
                    "timeout must not exceed {} seconds, got {}",
                    MAX_TIMEOUT_SECS, self.timeout
                ),
            ));
        }
        Ok(())
    }

    /// Window during which a single endpoint is retried
    pub fn communication_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.clamp(1, MAX_TIMEOUT_SECS) as u64)
    }

    pub fn scheme(&self) -> &'static str {
        if self.development {
            "http"
        } else {
            "https"
        }
    }

    /// Parsed `start_at`; an unparsable value is logged and ignored
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.start_at.as_deref()?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!("Ignoring start_at '{}': {}", raw, e);
                None
            }
        }
    }

    /// Directory holding everything belonging to this experiment
    pub fn experiment_dir(&self, root: &Path) -> PathBuf {
        root.join(format!("experiment_{}", self.experiment_id))
    }
}
