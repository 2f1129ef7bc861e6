//! The network seam of the dispatcher: one attempt against one endpoint.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use std::time::Duration;
use url::Url;

use super::request::{Credentials, RequestBody};
use crate::config::WorkerConfig;
use crate::error::{ErrorCode, Result, WorkerError};

/// A fully resolved request for a single attempt
#[derive(Debug)]
pub struct OutboundRequest<'a> {
    pub method: Method,
    pub endpoint: &'a str,
    pub path: &'a str,
    pub url: Url,
    pub body: &'a RequestBody,
    pub credentials: &'a Credentials,
}

/// Failure to obtain any HTTP response. Status codes are never errors at this layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("connection refused by {0}")]
    Refused(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one attempt and return the raw response body
    async fn send(&self, request: &OutboundRequest<'_>) -> std::result::Result<Vec<u8>, TransportError>;
}

/// Production transport backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest<'_>) -> std::result::Result<Vec<u8>, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .basic_auth(&request.credentials.user, Some(&request.credentials.password));

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::File {
                field,
                file_name,
                content,
            } => {
                let part = Part::bytes(content.clone()).file_name(file_name.clone());
                builder.multipart(Form::new().part(field.clone(), part))
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        tracing::debug!(
            "{} {} answered {} ({} bytes)",
            request.method,
            request.url,
            status,
            body.len()
        );

        Ok(body.to_vec())
    }
}

/// Build the HTTP client honouring the trust-anchor and verification settings
pub fn build_http_client(config: &WorkerConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(config.insecure_ssl);

    if config.insecure_ssl {
        tracing::warn!("TLS certificate verification is disabled");
    }

    if let Some(path) = &config.scalarm_certificate_path {
        let pem = std::fs::read(path).map_err(|e| {
            WorkerError::config_with_code(
                ErrorCode::CONFIG_TLS,
                format!("Could not load certificate {}", path.display()),
            )
            .with_source(e)
        })?;
        let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
            WorkerError::config_with_code(
                ErrorCode::CONFIG_TLS,
                format!("Invalid PEM certificate {}", path.display()),
            )
            .with_source(e)
        })?;
        builder = builder.add_root_certificate(certificate);
    }

    builder.build().map_err(|e| {
        WorkerError::transport_with_code(
            ErrorCode::TRANSPORT_CLIENT_BUILD,
            "Failed to create HTTP client",
        )
        .with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> WorkerConfig {
        WorkerConfig::from_json(&format!(
            r#"{{"experiment_id": "1", "information_service_url": "is:1"{}}}"#,
            extra
        ))
        .unwrap()
    }

    #[test]
    fn test_client_builds_with_defaults() {
        assert!(build_http_client(&config("")).is_ok());
    }

    #[test]
    fn test_missing_certificate_is_config_error() {
        let err = build_http_client(&config(
            r#", "scalarm_certificate_path": "/nonexistent/ca.pem""#,
        ))
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_TLS);
    }

    #[test]
    fn test_garbage_certificate_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, "not a certificate").unwrap();

        let result = build_http_client(&config(&format!(
            r#", "scalarm_certificate_path": "{}""#,
            path.display()
        )));
        // native-tls defers some PEM validation to client construction
        if let Err(err) = result {
            assert_eq!(err.code() / 1000, 1);
        }
    }
}
