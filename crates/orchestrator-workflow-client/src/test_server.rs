//! In-process fake workflow engine used by unit tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::StreamExt as _;
use futures::stream::{self, BoxStream};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};

use crate::client::CWD_HEADER;
use crate::config::WorkflowClientConfig;
use crate::framing::RECORD_SEPARATOR;
use crate::{WorkflowClient, WorkflowEvent};

pub(crate) const WORKFLOW: &str = "test-workflow";

/// One piece of the scripted watch body.
#[derive(Clone)]
pub(crate) enum Chunk {
    Bytes(Vec<u8>),
    /// Aborts the response body mid-stream, after the preceding chunks have
    /// been flushed to the client.
    Fail,
}

#[derive(Clone)]
pub(crate) struct StreamScript {
    pub create_status: u16,
    pub create_body: String,
    pub start_status: u16,
    pub watch_status: u16,
    pub chunks: Vec<Chunk>,
    /// Keep the watch body open after the last chunk.
    pub hold_open: bool,
    /// Hold the watch body until the start endpoint is called.
    pub wait_for_start: bool,
    /// Never answer the watch request, not even with headers.
    pub hold_headers: bool,
}

impl Default for StreamScript {
    fn default() -> Self {
        Self {
            create_status: 200,
            create_body: r#"{"runId":"test-run-id"}"#.to_string(),
            start_status: 200,
            watch_status: 200,
            chunks: Vec::new(),
            hold_open: false,
            wait_for_start: false,
            hold_headers: false,
        }
    }
}

#[derive(Clone)]
struct EngineState {
    script: Arc<StreamScript>,
    create_bodies: Arc<Mutex<Vec<serde_json::Value>>>,
    start_calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
    last_authorization: Arc<Mutex<Option<String>>>,
    watch_requests: Arc<AtomicUsize>,
    started: Arc<watch::Sender<bool>>,
}

#[derive(Deserialize)]
struct RunQuery {
    #[serde(rename = "runId")]
    run_id: String,
}

pub(crate) struct FakeEngine {
    addr: SocketAddr,
    state: EngineState,
}

impl FakeEngine {
    pub async fn spawn(script: StreamScript) -> Self {
        let (started, _) = watch::channel(false);
        let state = EngineState {
            script: Arc::new(script),
            create_bodies: Arc::default(),
            start_calls: Arc::default(),
            last_authorization: Arc::default(),
            watch_requests: Arc::default(),
            started: Arc::new(started),
        };
        let app = Router::new()
            .route(
                &format!("/api/workflows/{WORKFLOW}/create-run"),
                post(create_run),
            )
            .route(&format!("/api/workflows/{WORKFLOW}/start"), post(start))
            .route(&format!("/api/workflows/{WORKFLOW}/watch"), get(watch_run))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        Self { addr, state }
    }

    pub fn config(&self) -> WorkflowClientConfig {
        WorkflowClientConfig::new(WORKFLOW).base_url(format!("http://{}", self.addr))
    }

    pub fn client(&self) -> WorkflowClient {
        WorkflowClient::new(self.config()).expect("client")
    }

    pub async fn create_bodies(&self) -> Vec<serde_json::Value> {
        self.state.create_bodies.lock().await.clone()
    }

    pub async fn start_calls(&self) -> Vec<(String, Option<String>)> {
        self.state.start_calls.lock().await.clone()
    }

    pub async fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.lock().await.clone()
    }

    pub fn watch_requests(&self) -> usize {
        self.state.watch_requests.load(Ordering::SeqCst)
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).expect("valid status")
}

async fn record_authorization(state: &EngineState, headers: &HeaderMap) {
    let value = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    *state.last_authorization.lock().await = value;
}

async fn create_run(
    State(state): State<EngineState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    record_authorization(&state, &headers).await;
    let parsed = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    state.create_bodies.lock().await.push(parsed);
    (
        status(state.script.create_status),
        state.script.create_body.clone(),
    )
        .into_response()
}

async fn start(
    State(state): State<EngineState>,
    Query(query): Query<RunQuery>,
    headers: HeaderMap,
) -> Response {
    record_authorization(&state, &headers).await;
    let cwd = headers
        .get(CWD_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    state.start_calls.lock().await.push((query.run_id, cwd));
    state.started.send_replace(true);
    status(state.script.start_status).into_response()
}

async fn watch_run(State(state): State<EngineState>, Query(_query): Query<RunQuery>) -> Response {
    state.watch_requests.fetch_add(1, Ordering::SeqCst);
    let script = state.script.clone();
    if script.hold_headers {
        std::future::pending::<()>().await;
    }
    if !(200..300).contains(&script.watch_status) {
        return status(script.watch_status).into_response();
    }

    let mut started = state.started.subscribe();
    let wait_for_start = script.wait_for_start;
    let gate = stream::once(async move {
        if wait_for_start {
            let _ = started.wait_for(|s| *s).await;
        }
    })
    .filter_map(|_| async { None::<Result<Vec<u8>, std::io::Error>> });

    let scripted = stream::iter(script.chunks.clone()).then(|chunk| async move {
        match chunk {
            Chunk::Bytes(bytes) => Ok(bytes),
            Chunk::Fail => {
                // hyper drops the connection without headers if the body
                // errors before its first frame is written.
                tokio::time::sleep(Duration::from_millis(100)).await;
                Err(std::io::Error::other("scripted stream failure"))
            }
        }
    });
    let tail: BoxStream<'static, Result<Vec<u8>, std::io::Error>> = if script.hold_open {
        stream::pending().boxed()
    } else {
        stream::empty().boxed()
    };

    Body::from_stream(gate.chain(scripted).chain(tail)).into_response()
}

/// Frames one watch envelope with the given payload.
pub(crate) fn envelope(payload: serde_json::Value) -> Vec<u8> {
    let event = WorkflowEvent {
        event_type: "watch".into(),
        payload,
    };
    let mut bytes = serde_json::to_vec(&event).expect("serialize envelope");
    bytes.push(RECORD_SEPARATOR);
    bytes
}

/// thinking, thinking, clarification, finished.
pub(crate) fn fixture_stream() -> Vec<u8> {
    [
        serde_json::json!({"step":"thinking","message":"Reading the project layout"}),
        serde_json::json!({"step":"thinking","message":"Drafting a plan"}),
        serde_json::json!({"step":"clarification","prompt":"Which package should be changed?"}),
        serde_json::json!({"step":"finished","result":{"summary":"plan ready"}}),
    ]
    .into_iter()
    .flat_map(envelope)
    .collect()
}
