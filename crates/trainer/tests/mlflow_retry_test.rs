//! MLflow registration under retries, against an in-process HTTP server
//! that speaks the handful of REST endpoints the tracker uses.

use anyhow::Result;
use parking_lot::Mutex;
use readiness_tracking::{ExperimentContext, MlflowTracker, ModelArtifact, TrackingBackend};
use readiness_trainer::{RetryPolicy, RetryingTracker};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const CLIENT_TIMEOUT: Duration = Duration::from_millis(300);
const STALL: Duration = Duration::from_millis(1000);

#[derive(Default)]
struct Registry {
    runs: usize,
    model_created: bool,
    create_calls: usize,
    /// (run_id, source) per published version; version = index + 1
    versions: Vec<(String, String)>,
    stall_next_create: bool,
}

struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &TcpStream) -> Option<Request> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.split('?').next()?.to_string();

    let mut length = 0;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                length = value.trim().parse().ok()?;
            }
        }
    }
    let mut body = vec![0; length];
    reader.read_exact(&mut body).ok()?;
    Some(Request { method, path, body })
}

fn respond(registry: &Mutex<Registry>, request: &Request) -> (u16, Value, Option<Duration>) {
    let mut state = registry.lock();
    let endpoint = request
        .path
        .trim_start_matches("/api/2.0/mlflow/")
        .to_string();

    match (request.method.as_str(), endpoint.as_str()) {
        ("GET", "experiments/get-by-name") => {
            (200, json!({ "experiment": { "experiment_id": "1" } }), None)
        }
        ("POST", "runs/create") => {
            state.runs += 1;
            let run_id = format!("run-{}", state.runs);
            (200, json!({ "run": { "info": { "run_id": run_id } } }), None)
        }
        ("PUT", _) if request.path.starts_with("/api/2.0/mlflow-artifacts/") => (200, json!({}), None),
        ("POST", "registered-models/create") => {
            if state.model_created {
                (
                    400,
                    json!({ "error_code": "RESOURCE_ALREADY_EXISTS", "message": "exists" }),
                    None,
                )
            } else {
                state.model_created = true;
                (200, json!({ "registered_model": {} }), None)
            }
        }
        ("GET", "model-versions/search") => {
            let versions: Vec<Value> = state
                .versions
                .iter()
                .enumerate()
                .map(|(i, (run_id, source))| {
                    json!({ "version": (i + 1).to_string(), "run_id": run_id, "source": source })
                })
                .collect();
            (200, json!({ "model_versions": versions }), None)
        }
        ("POST", "model-versions/create") => {
            let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
            state.create_calls += 1;
            state.versions.push((
                body["run_id"].as_str().unwrap_or_default().to_string(),
                body["source"].as_str().unwrap_or_default().to_string(),
            ));
            let version = state.versions.len().to_string();
            let stall = std::mem::take(&mut state.stall_next_create).then_some(STALL);
            (200, json!({ "model_version": { "version": version } }), stall)
        }
        ("POST", "runs/update") => (200, json!({}), None),
        _ => (
            404,
            json!({ "error_code": "RESOURCE_DOES_NOT_EXIST", "message": request.path }),
            None,
        ),
    }
}

/// Serve each connection on its own thread so one stalled response does
/// not hold up the retry
fn start_server(registry: Arc<Mutex<Registry>>) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let Some(request) = read_request(&stream) else { return };
                let (status, body, delay) = respond(&registry, &request);
                if let Some(delay) = delay {
                    thread::sleep(delay);
                }
                let body = body.to_string();
                let _ = write!(
                    stream,
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
            });
        }
    });
    Ok(format!("http://{}", addr))
}

fn retrying(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts: attempts,
        initial_backoff: Duration::ZERO,
        multiplier: 1.0,
        max_backoff: Duration::ZERO,
    }
}

fn ctx() -> ExperimentContext {
    ExperimentContext::new("retirement-prediction", "retirement_rf_model")
}

#[test]
fn test_lost_version_response_does_not_publish_twice() -> Result<()> {
    let registry = Arc::new(Mutex::new(Registry {
        stall_next_create: true,
        ..Registry::default()
    }));
    let uri = start_server(Arc::clone(&registry))?;
    let mlflow = MlflowTracker::new(&uri, CLIENT_TIMEOUT)?;
    let tracker = RetryingTracker::new(&mlflow, retrying(3));

    let run = tracker.start_run(&ctx(), None)?;
    let artifact = ModelArtifact::new("model", "model.bin", vec![1, 2, 3]);
    let registration = tracker.log_model(&run, &artifact, Some("retirement_rf_model"))?;

    assert_eq!(registration.version, Some(1));
    let state = registry.lock();
    assert_eq!(state.create_calls, 1);
    assert_eq!(state.versions.len(), 1);
    Ok(())
}

#[test]
fn test_each_run_gets_its_own_version() -> Result<()> {
    let registry = Arc::new(Mutex::new(Registry::default()));
    let uri = start_server(Arc::clone(&registry))?;
    let mlflow = MlflowTracker::new(&uri, Duration::from_secs(5))?;
    let artifact = ModelArtifact::new("model", "model.bin", vec![7; 16]);

    let first = mlflow.start_run(&ctx(), None)?;
    let second = mlflow.start_run(&ctx(), None)?;
    let v1 = mlflow.log_model(&first, &artifact, Some("retirement_rf_model"))?;
    let v2 = mlflow.log_model(&second, &artifact, Some("retirement_rf_model"))?;
    let again = mlflow.log_model(&first, &artifact, Some("retirement_rf_model"))?;

    assert_eq!(v1.version, Some(1));
    assert_eq!(v2.version, Some(2));
    assert_eq!(again.version, Some(1));
    assert_eq!(registry.lock().create_calls, 2);
    Ok(())
}
