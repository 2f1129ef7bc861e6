use serde_json::{Map, Value};
use std::time::Duration;

use crate::dispatch::{Dispatcher, EndpointPool, RequestSpec};
use crate::error::Result;
use crate::job::SimulationRunResult;

/// Window granted to each coordinator when posting intermediate progress
pub const PROGRESS_REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// One simulation run assigned to this worker
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationJob {
    pub job_id: u64,
    pub input_parameters: Map<String, Value>,
    pub execution_constraints: Value,
}

/// Classified answer to a `next_simulation` request
#[derive(Debug, Clone, PartialEq)]
pub enum NextSimulation {
    Ready(SimulationJob),
    /// Nothing to hand out right now; ask again after the given pause
    Wait(Duration),
    /// The experiment has no more runs for anyone
    AllSent,
    /// The coordinator reported an error of its own
    Failed,
    Unsupported(String),
}

/// A response body that does not have the expected shape
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("response has no '{0}' field")]
    MissingField(&'static str),

    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Decode the body of `experiments/{id}/next_simulation`
pub fn decode_next_simulation(body: &[u8]) -> std::result::Result<NextSimulation, DecodeError> {
    let value: Value = serde_json::from_slice(body)?;
    let reply = value.as_object().ok_or(DecodeError::InvalidField {
        field: "body",
        reason: "expected a JSON object".to_string(),
    })?;

    let status = reply
        .get("status")
        .ok_or(DecodeError::MissingField("status"))?
        .as_str()
        .ok_or(DecodeError::InvalidField {
            field: "status",
            reason: "expected a string".to_string(),
        })?;

    match status {
        "ok" => decode_job(reply).map(NextSimulation::Ready),
        "wait" => {
            let seconds = reply
                .get("duration_in_seconds")
                .ok_or(DecodeError::MissingField("duration_in_seconds"))?
                .as_f64()
                .ok_or(DecodeError::InvalidField {
                    field: "duration_in_seconds",
                    reason: "expected a number".to_string(),
                })?;
            Ok(NextSimulation::Wait(
                Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX),
            ))
        }
        "all_sent" => Ok(NextSimulation::AllSent),
        "error" => Ok(NextSimulation::Failed),
        other => Ok(NextSimulation::Unsupported(other.to_string())),
    }
}

fn decode_job(reply: &Map<String, Value>) -> std::result::Result<SimulationJob, DecodeError> {
    let raw_id = reply
        .get("simulation_id")
        .ok_or(DecodeError::MissingField("simulation_id"))?;
    let job_id = raw_id
        .as_u64()
        .or_else(|| {
            raw_id
                .as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        })
        .ok_or_else(|| DecodeError::InvalidField {
            field: "simulation_id",
            reason: format!("expected a non-negative integer, got {}", raw_id),
        })?;

    let input_parameters = match reply.get("input_parameters") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(DecodeError::InvalidField {
                field: "input_parameters",
                reason: format!("expected an object, got {}", other),
            })
        }
    };

    Ok(SimulationJob {
        job_id,
        input_parameters,
        execution_constraints: reply
            .get("execution_constraints")
            .cloned()
            .unwrap_or(Value::Null),
    })
}

/// Client for the coordinator ("experiment manager") role
#[derive(Clone)]
pub struct ExperimentManagerClient {
    dispatcher: Dispatcher,
    pool: EndpointPool,
    experiment_id: String,
    timeout: Duration,
}

impl ExperimentManagerClient {
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

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    /// Per-endpoint retry window used for every call except progress reports
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask for the next run; transport exhaustion is fatal, a malformed body is not
    pub async fn next_simulation(
        &self,
    ) -> Result<std::result::Result<NextSimulation, DecodeError>> {
        let body = self
            .dispatcher
            .dispatch(
                &RequestSpec::get(format!(
                    "experiments/{}/next_simulation",
                    self.experiment_id
                )),
                &self.pool,
                self.timeout,
            )
            .await?;

        tracing::debug!("Next simulation: {}", String::from_utf8_lossy(&body));
        Ok(decode_next_simulation(&body))
    }

    /// Zip archive holding the experiment's adapters and binaries
    pub async fn download_code_base(&self) -> Result<Vec<u8>> {
        self.dispatcher
            .dispatch(
                &RequestSpec::get(format!("experiments/{}/code_base", self.experiment_id)),
                &self.pool,
                self.timeout,
            )
            .await
    }

    pub async fn report_progress(&self, job_id: u64, result: &SimulationRunResult) -> Result<Vec<u8>> {
        self.dispatcher
            .dispatch(
                &RequestSpec::post_form(
                    format!(
                        "experiments/{}/simulations/{}/progress_info",
                        self.experiment_id, job_id
                    ),
                    result.form_fields(),
                ),
                &self.pool,
                PROGRESS_REPORT_TIMEOUT,
            )
            .await
    }

    pub async fn mark_as_complete(
        &self,
        job_id: u64,
        result: &SimulationRunResult,
    ) -> Result<Vec<u8>> {
        self.dispatcher
            .dispatch(
                &RequestSpec::post_form(
                    format!(
                        "experiments/{}/simulations/{}/mark_as_complete",
                        self.experiment_id, job_id
                    ),
                    result.form_fields(),
                ),
                &self.pool,
                self.timeout,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Credentials, MockTransport, RequestBody};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_decode_ready_job() {
        let decoded = decode_next_simulation(
            br#"{"status":"ok","simulation_id":3,"input_parameters":{"x":1},
                "execution_constraints":{"time_constraint_in_sec":3300}}"#,
        )
        .unwrap();

        match decoded {
            NextSimulation::Ready(job) => {
                assert_eq!(job.job_id, 3);
                assert_eq!(Value::Object(job.input_parameters), json!({"x": 1}));
                assert_eq!(
                    job.execution_constraints,
                    json!({"time_constraint_in_sec": 3300})
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_float_simulation_id() {
        let decoded =
            decode_next_simulation(br#"{"status":"ok","simulation_id":12.0}"#).unwrap();
        assert!(matches!(decoded, NextSimulation::Ready(ref job) if job.job_id == 12));
    }

    #[test]
    fn test_decode_wait() {
        let decoded =
            decode_next_simulation(br#"{"status":"wait","duration_in_seconds":5}"#).unwrap();
        assert_eq!(decoded, NextSimulation::Wait(Duration::from_secs(5)));
    }

    #[test]
    fn test_decode_terminal_and_error_statuses() {
        assert_eq!(
            decode_next_simulation(br#"{"status":"all_sent"}"#).unwrap(),
            NextSimulation::AllSent
        );
        assert_eq!(
            decode_next_simulation(br#"{"status":"error","reason":"db down"}"#).unwrap(),
            NextSimulation::Failed
        );
        assert_eq!(
            decode_next_simulation(br#"{"status":"paused"}"#).unwrap(),
            NextSimulation::Unsupported("paused".to_string())
        );
    }

    #[test]
    fn test_decode_failures_are_typed() {
        assert!(matches!(
            decode_next_simulation(b"<html>502</html>"),
            Err(DecodeError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_next_simulation(br#"{"simulation_id":1}"#),
            Err(DecodeError::MissingField("status"))
        ));
        assert!(matches!(
            decode_next_simulation(br#"{"status":"wait"}"#),
            Err(DecodeError::MissingField("duration_in_seconds"))
        ));
        assert!(matches!(
            decode_next_simulation(br#"{"status":"ok","simulation_id":-1}"#),
            Err(DecodeError::InvalidField { field: "simulation_id", .. })
        ));
        assert!(matches!(
            decode_next_simulation(br#"{"status":"ok","simulation_id":1,"input_parameters":[1]}"#),
            Err(DecodeError::InvalidField { field: "input_parameters", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_as_complete_posts_result_form() {
        let transport = MockTransport::new();
        transport.respond("experiments/e1/simulations/4/mark_as_complete", "{}");
        let dispatcher = Dispatcher::new(
            Arc::new(transport.clone()),
            "https",
            Credentials::default(),
        );
        let client = ExperimentManagerClient::new(
            dispatcher,
            EndpointPool::single("experiment manager", "em:1"),
            "e1",
            Duration::from_secs(5),
        );

        client
            .mark_as_complete(4, &SimulationRunResult::ok(json!({"y": 2})))
            .await
            .unwrap();

        let recorded = transport.requests_to("experiments/e1/simulations/4/mark_as_complete");
        assert_eq!(recorded.len(), 1);
        assert_eq!(
            recorded[0].body,
            RequestBody::Form(vec![
                ("status".to_string(), "ok".to_string()),
                ("reason".to_string(), String::new()),
                ("result".to_string(), r#"{"y":2}"#.to_string()),
            ])
        );
    }
}
