//! Common test utilities: a fake platform serving the information service, experiment manager
//! and storage manager roles from a single local HTTP server.
#![allow(dead_code)]

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use zip::write::SimpleFileOptions;

pub const EXPERIMENT_ID: &str = "exp1";

/// An address nothing listens on
pub const UNREACHABLE: &str = "127.0.0.1:1";

/// A request received by the fake platform
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
    pub at: Instant,
}

impl RecordedCall {
    /// Decode an `application/x-www-form-urlencoded` body
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body)
            .into_owned()
            .collect()
    }
}

struct PlatformState {
    experiment_managers: Vec<String>,
    code_base: Vec<u8>,
    next_simulation: Mutex<VecDeque<Value>>,
    calls: Mutex<Vec<RecordedCall>>,
}

pub struct FakePlatform {
    pub addr: SocketAddr,
    state: Arc<PlatformState>,
}

/// Builder for the behaviour of a [`FakePlatform`]
pub struct PlatformScript {
    extra_experiment_managers: Vec<String>,
    next_simulation: Vec<Value>,
    code_base: Vec<u8>,
}

impl PlatformScript {
    pub fn new(code_base: Vec<u8>) -> Self {
        Self {
            extra_experiment_managers: Vec::new(),
            next_simulation: Vec::new(),
            code_base,
        }
    }

    /// Advertise an additional experiment manager address besides the fake platform itself
    pub fn with_experiment_manager(mut self, host: &str) -> Self {
        self.extra_experiment_managers.push(host.to_string());
        self
    }

    /// Queue a `next_simulation` answer; the last one repeats
    pub fn answer(mut self, reply: Value) -> Self {
        self.next_simulation.push(reply);
        self
    }

    pub async fn start(self) -> Result<FakePlatform> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let mut experiment_managers = self.extra_experiment_managers;
        experiment_managers.push(addr.to_string());

        let state = Arc::new(PlatformState {
            experiment_managers,
            code_base: self.code_base,
            next_simulation: Mutex::new(self.next_simulation.into()),
            calls: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("fake platform stopped: {}", e);
            }
        });

        Ok(FakePlatform { addr, state })
    }
}

impl FakePlatform {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn calls_ending_with(&self, suffix: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path.ends_with(suffix))
            .collect()
    }

    /// Worker configuration pointing at this platform over plain HTTP
    pub fn config_json(&self) -> String {
        json!({
            "experiment_id": EXPERIMENT_ID,
            "information_service_url": self.addr.to_string(),
            "experiment_manager_user": "worker",
            "experiment_manager_pass": "secret",
            "development": true,
            "timeout": 1
        })
        .to_string()
    }

    pub fn write_config(&self, dir: &Path) -> Result<std::path::PathBuf> {
        let path = dir.join("config.json");
        std::fs::write(&path, self.config_json())?;
        Ok(path)
    }
}

async fn handle(
    State(state): State<Arc<PlatformState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().trim_start_matches('/').to_string();
    state.calls.lock().unwrap().push(RecordedCall {
        method: method.to_string(),
        path: path.clone(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
        at: Instant::now(),
    });

    let segments: Vec<&str> = path.split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("GET", ["experiment_managers"]) => json_response(json!(state.experiment_managers)),
        ("GET", ["storage_managers"]) => json_response(json!([uri_authority(&state)])),
        ("GET", ["experiments", _, "code_base"]) => {
            (StatusCode::OK, state.code_base.clone()).into_response()
        }
        ("GET", ["experiments", _, "next_simulation"]) => {
            let mut queue = state.next_simulation.lock().unwrap();
            let reply = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            json_response(reply.unwrap_or_else(|| json!({"status": "all_sent"})))
        }
        ("POST", ["experiments", _, "simulations", _, "progress_info" | "mark_as_complete"])
        | ("PUT", ["experiments", _, "simulations", _])
        | ("PUT", ["experiments", _, "simulations", _, "stdout"]) => {
            json_response(json!({"status": "ok"}))
        }
        _ => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

fn uri_authority(state: &PlatformState) -> String {
    // The fake platform is always the last advertised experiment manager
    state.experiment_managers.last().cloned().unwrap_or_default()
}

fn json_response(value: Value) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        value.to_string(),
    )
        .into_response()
}

fn zip_of(entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(name.to_string(), SimpleFileOptions::default())?;
        writer.write_all(content)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// A `code_base.zip` holding the given adapter scripts and an inner `simulation_binaries.zip`
pub fn code_base_zip(adapters: &[(&str, &str)]) -> Result<Vec<u8>> {
    let binaries = zip_of(&[("README", b"no binaries needed".as_slice())])?;
    let mut entries: Vec<(&str, &[u8])> = adapters
        .iter()
        .map(|(name, script)| (*name, script.as_bytes()))
        .collect();
    entries.push(("simulation_binaries.zip", &binaries));
    zip_of(&entries)
}

/// Executor that echoes its input parameters back as the run's results
pub const ECHO_EXECUTOR: &str = "#!/bin/sh\n\
echo \"executing\"\n\
printf '{\"status\":\"ok\",\"results\":%s}' \"$(cat input.json)\" > output.json\n";

/// Progress monitor that always reports half of the work done
pub const HALFWAY_MONITOR: &str = "#!/bin/sh\n\
echo '{\"status\":\"ok\",\"results\":{\"progress\":0.5}}' > intermediate_result.json\n";

/// Executor that fails after printing a diagnostic
pub const FAILING_EXECUTOR: &str = "#!/bin/sh\necho \"boom: solver diverged\"\nexit 3\n";
