//! Bulk export job model.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle of a bulk export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Starting,
    Running,
    Finished,
}

/// One bulk export job.
///
/// All mutable fields live behind the job's lock; concurrent workers append
/// failures and bump progress through it, and snapshot reads observe a
/// consistent pair.
pub struct Job {
    id: String,
    n_workers: usize,
    throttle: Duration,
    state: RwLock<JobState>,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    approximate_count: usize,
    progress: usize,
    failed: Vec<String>,
    error_message: Option<String>,
}

/// Owned, serialisable copy of a job's observable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Status")]
    pub status: JobStatus,
    #[serde(rename = "ApproximateCount", skip_serializing_if = "is_zero")]
    pub approximate_count: usize,
    #[serde(rename = "Progress", skip_serializing_if = "is_zero")]
    pub progress: usize,
    #[serde(rename = "Failed", skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
    #[serde(rename = "ErrorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

impl Job {
    pub fn new(n_workers: usize, throttle: Duration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            n_workers,
            throttle,
            state: RwLock::new(JobState {
                status: JobStatus::Starting,
                approximate_count: 0,
                progress: 0,
                failed: Vec::new(),
                error_message: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    pub fn throttle(&self) -> Duration {
        self.throttle
    }

    pub async fn status(&self) -> JobStatus {
        self.state.read().await.status
    }

    pub async fn set_approximate_count(&self, count: usize) {
        self.state.write().await.approximate_count = count;
    }

    pub(crate) async fn mark_running(&self) {
        self.state.write().await.status = JobStatus::Running;
    }

    /// Terminate the job before it ran: record the startup failure.
    pub async fn fail(&self, message: impl Into<String>) {
        let mut state = self.state.write().await;
        state.error_message = Some(message.into());
        state.status = JobStatus::Finished;
    }

    /// Returns `(failures, progress)` for the finish summary.
    pub(crate) async fn mark_finished(&self) -> (usize, usize) {
        let mut state = self.state.write().await;
        state.status = JobStatus::Finished;
        (state.failed.len(), state.progress)
    }

    pub(crate) async fn increment_progress(&self) {
        self.state.write().await.progress += 1;
    }

    pub(crate) async fn record_failure(&self, uuid: String) {
        self.state.write().await.failed.push(uuid);
    }

    /// Deep copy of the observable state; never exposes live internals.
    pub async fn snapshot(&self) -> JobSnapshot {
        let state = self.state.read().await;
        JobSnapshot {
            id: self.id.clone(),
            status: state.status,
            approximate_count: state.approximate_count,
            progress: state.progress,
            failed: state.failed.clone(),
            error_message: state.error_message.clone(),
        }
    }
}
