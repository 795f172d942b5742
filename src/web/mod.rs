//! HTTP surface for operating bulk exports.
//!
//! `POST /export` rejects concurrent jobs, runs the lock handshake against
//! the incremental side when that side is enabled, registers the job and
//! answers 202 immediately; the inquiry and the drain happen on a spawned
//! task. `GET /jobs/{id}` and `GET /jobs` serve snapshots.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::export::{FullExporter, Job, Locker};
use crate::queue::TRANSACTION_ID_HEADER;
use crate::store::Inquirer;

/// Shared state behind the job API.
pub struct AppState {
    pub exporter: Arc<FullExporter>,
    pub inquirer: Arc<dyn Inquirer>,
    pub locker: Locker,
    pub incremental_enabled: bool,
    pub collection: String,
}

/// Build the job API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/export", post(start_export))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The job API plus the health surface, as one router.
pub fn service_router(state: Arc<AppState>, health: crate::health::HealthService) -> Router {
    router(state).merge(health.router())
}

/// Serve a router until the shutdown future resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn start_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let tid = transaction_id(&headers);

    if state.exporter.any_running().await {
        return (
            StatusCode::BAD_REQUEST,
            "There are already running export jobs. Please wait for them to finish",
        )
            .into_response();
    }

    if state.incremental_enabled {
        if let Err(err) = state.locker.lock().await {
            info!(error = %err, "lock initiation failed");
            return (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response();
        }
        info!("lock initiated");
        if let Err(err) = state.locker.await_ack().await {
            info!(error = %err, "lock acquisition failed");
            return (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response();
        }
        info!("lock acquired");
    }

    let candidates = candidate_uuids(&body);
    let job = state.exporter.new_job();
    state.exporter.add_job(job.clone()).await;
    let snapshot = job.snapshot().await;

    tokio::spawn(run_export(state, job, tid, candidates));

    (StatusCode::ACCEPTED, Json(snapshot)).into_response()
}

async fn run_export(state: Arc<AppState>, job: Arc<Job>, tid: String, candidates: Vec<String>) {
    match state.inquirer.inquire(&state.collection, candidates).await {
        Err(err) => {
            let message = format!(
                "Failed to read identifiers from the {} collection: {}",
                state.collection, err
            );
            error!(job_id = %job.id(), error = %err, "bulk export startup failed");
            job.fail(message).await;
        }
        Ok((stubs, count)) => {
            info!(job_id = %job.id(), count, "documents matched for export");
            job.set_approximate_count(count).await;
            state.exporter.run(job, &tid, stubs).await;
        }
    }

    if state.incremental_enabled {
        info!("lock released");
        state.locker.unlock().await;
    }
}

async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.exporter.job(&id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"message": err.to_string()})),
        )
            .into_response(),
    }
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Response {
    Json(state.exporter.running_jobs().await).into_response()
}

fn transaction_id(headers: &HeaderMap) -> String {
    headers
        .get(TRANSACTION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("tid_{}", Uuid::new_v4().simple()))
}

/// A body is optional and lenient: anything that is not a JSON object with
/// a space-separated `ids` string means "no candidates".
fn candidate_uuids(body: &[u8]) -> Vec<String> {
    if body.is_empty() {
        return Vec::new();
    }
    let parsed: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "no valid json body, no candidate ids to export");
            return Vec::new();
        }
    };
    match parsed.get("ids").and_then(Value::as_str) {
        Some(ids) => ids.split_whitespace().map(str::to_string).collect(),
        None => {
            debug!("no ids field in the json body, no candidate ids to export");
            Vec::new()
        }
    }
}
