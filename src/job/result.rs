use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
        }
    }
}

/// Outcome of a run as written by the adapters to `output.json` or `intermediate_result.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRunResult {
    pub status: RunStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub results: Value,
}

impl SimulationRunResult {
    pub fn ok(results: Value) -> Self {
        Self {
            status: RunStatus::Ok,
            reason: String::new(),
            results,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            reason: reason.into(),
            results: Value::Null,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == RunStatus::Ok
    }

    /// Form fields understood by `progress_info` and `mark_as_complete`
    pub fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("status".to_string(), self.status.as_str().to_string()),
            ("reason".to_string(), self.reason.clone()),
            ("result".to_string(), self.results.to_string()),
        ]
    }
}

/// Read a result file written by an adapter.
///
/// Never fails: a missing, unreadable or malformed file becomes an `error` result whose reason
/// names the file.
pub async fn read_result_file(path: &Path) -> SimulationRunResult {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return SimulationRunResult::error(format!("No '{}' file found: {}", name, e));
        }
        Err(e) => {
            return SimulationRunResult::error(format!("Could not open '{}': {}", name, e));
        }
    };

    let document: Value = match serde_json::from_slice(&content) {
        Ok(document) => document,
        Err(e) => {
            return SimulationRunResult::error(format!("Error during '{}' parsing: {}", name, e))
        }
    };

    if let Some(status) = document.get("status").and_then(Value::as_str) {
        if !matches!(status, "ok" | "error") {
            return SimulationRunResult::error(format!(
                "Unsupported status '{}' in '{}'",
                status, name
            ));
        }
    }

    match serde_json::from_value(document) {
        Ok(result) => result,
        Err(e) => {
            SimulationRunResult::error(format!("Error during '{}' parsing: {}", name, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_valid_result() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.json");
        std::fs::write(&path, r#"{"status":"ok","results":{"y":0.5}}"#).unwrap();

        let result = read_result_file(&path).await;
        assert!(result.is_ok());
        assert_eq!(result.reason, "");
        assert_eq!(result.results, json!({"y": 0.5}));
    }

    #[tokio::test]
    async fn test_missing_file_becomes_error_naming_it() {
        let dir = TempDir::new().unwrap();
        let result = read_result_file(&dir.path().join("output.json")).await;

        assert_eq!(result.status, RunStatus::Error);
        assert!(result.reason.contains("output.json"));
        assert_eq!(result.results, Value::Null);
    }

    #[tokio::test]
    async fn test_unparsable_file_becomes_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intermediate_result.json");
        std::fs::write(&path, "{\"status\": ").unwrap();

        let result = read_result_file(&path).await;
        assert_eq!(result.status, RunStatus::Error);
        assert!(result.reason.contains("intermediate_result.json"));
        assert!(result.reason.contains("parsing"));
    }

    #[tokio::test]
    async fn test_status_is_required() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.json");
        std::fs::write(&path, r#"{"results":{"y":1}}"#).unwrap();

        assert_eq!(read_result_file(&path).await.status, RunStatus::Error);
    }

    #[tokio::test]
    async fn test_unknown_status_names_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.json");
        std::fs::write(&path, r#"{"status":"running","results":{"y":1}}"#).unwrap();

        let result = read_result_file(&path).await;
        assert_eq!(result.status, RunStatus::Error);
        assert_eq!(result.reason, "Unsupported status 'running' in 'output.json'");
        assert_eq!(result.results, Value::Null);
    }

    #[test]
    fn test_form_fields_encode_results_as_json() {
        let fields = SimulationRunResult::error("boom").form_fields();
        assert_eq!(fields[0], ("status".to_string(), "error".to_string()));
        assert_eq!(fields[1], ("reason".to_string(), "boom".to_string()));
        assert_eq!(fields[2], ("result".to_string(), "null".to_string()));
    }
}
