//! Shared test fixtures: a recording upstream double and polling helpers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

/// One request as seen by the upstream double.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub tid: String,
}

/// Configurable behaviour and call log of the upstream double.
pub struct UpstreamState {
    pub requests: Mutex<Vec<RecordedRequest>>,
    pub fetch_status: AtomicU16,
    pub fetch_body: Mutex<String>,
    pub put_status: AtomicU16,
    pub delete_status: AtomicU16,
}

impl Default for UpstreamState {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fetch_status: AtomicU16::new(200),
            fetch_body: Mutex::new(r#"{"uuid":"x"}"#.to_string()),
            put_status: AtomicU16::new(200),
            delete_status: AtomicU16::new(200),
        }
    }
}

impl UpstreamState {
    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests excluding health probes.
    pub fn content_requests(&self) -> Vec<RecordedRequest> {
        self.recorded()
            .into_iter()
            .filter(|r| !r.path.starts_with("/__"))
            .collect()
    }
}

/// A bound upstream double serving both collaborator roles.
pub struct FakeUpstream {
    pub base_url: String,
    pub state: Arc<UpstreamState>,
}

/// Install the test log subscriber once; later calls are no-ops.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn spawn_upstream() -> FakeUpstream {
    init_tracing();
    let state = Arc::new(UpstreamState::default());
    let app = Router::new().fallback(record).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream double");
    let addr: SocketAddr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    FakeUpstream {
        base_url: format!("http://{addr}"),
        state,
    }
}

async fn record(State(state): State<Arc<UpstreamState>>, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let tid = request
        .headers()
        .get("X-Request-Id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        query,
        tid,
    });

    if path.starts_with("/__gtg") {
        return StatusCode::OK.into_response();
    }
    if method == Method::GET && path.starts_with("/enrichedcontent/") {
        let status = StatusCode::from_u16(state.fetch_status.load(Ordering::SeqCst))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = state.fetch_body.lock().unwrap().clone();
        return (status, body).into_response();
    }
    if method == Method::PUT && path.starts_with("/content/") {
        let status = StatusCode::from_u16(state.put_status.load(Ordering::SeqCst))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return status.into_response();
    }
    if method == Method::DELETE && path.starts_with("/content/") {
        let status = StatusCode::from_u16(state.delete_status.load(Ordering::SeqCst))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return status.into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}

/// Poll until the condition holds or the deadline passes.
pub async fn wait_for(description: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {description}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
