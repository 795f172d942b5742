//! Job registry and the per-job worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::content::{ContentExporter, Stub};
use crate::error::JobError;

use super::job::{Job, JobSnapshot, JobStatus};

/// Registers bulk export jobs and drains their stub streams.
pub struct FullExporter {
    jobs: RwLock<HashMap<String, Arc<Job>>>,
    n_workers: usize,
    throttle: Duration,
    exporter: Arc<ContentExporter>,
}

impl FullExporter {
    pub fn new(n_workers: usize, throttle: Duration, exporter: Arc<ContentExporter>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            n_workers,
            throttle,
            exporter,
        }
    }

    /// Create a job with the engine's worker and throttle settings.
    pub fn new_job(&self) -> Arc<Job> {
        Arc::new(Job::new(self.n_workers, self.throttle))
    }

    pub async fn add_job(&self, job: Arc<Job>) {
        self.jobs.write().await.insert(job.id().to_string(), job);
    }

    pub async fn job(&self, id: &str) -> Result<JobSnapshot, JobError> {
        let jobs = self.jobs.read().await;
        match jobs.get(id) {
            Some(job) => Ok(job.snapshot().await),
            None => Err(JobError::NotFound(id.to_string())),
        }
    }

    pub async fn running_jobs(&self) -> Vec<JobSnapshot> {
        let jobs = self.jobs.read().await;
        let mut running = Vec::new();
        for job in jobs.values() {
            if job.status().await == JobStatus::Running {
                running.push(job.snapshot().await);
            }
        }
        running
    }

    pub async fn any_running(&self) -> bool {
        let jobs = self.jobs.read().await;
        for job in jobs.values() {
            if job.status().await == JobStatus::Running {
                return true;
            }
        }
        false
    }

    /// Drain the stub stream into bounded workers until it closes, then
    /// quiesce and finish the job.
    ///
    /// Per-document failures append to the job's failed list and never
    /// abort the drain. An empty stream finishes immediately with zero
    /// progress.
    pub async fn run(&self, job: Arc<Job>, tid: &str, mut stubs: mpsc::Receiver<Stub>) {
        info!(job_id = %job.id(), "job started");
        job.mark_running().await;

        let slots = Arc::new(Semaphore::new(job.n_workers().max(1)));
        let mut workers = JoinSet::new();

        while let Some(stub) = stubs.recv().await {
            let Ok(permit) = slots.clone().acquire_owned().await else {
                break;
            };
            job.increment_progress().await;

            let job = job.clone();
            let exporter = self.exporter.clone();
            let tid = tid.to_string();
            let throttle = job.throttle();
            workers.spawn(async move {
                tokio::time::sleep(throttle).await;
                if let Err(err) = exporter.handle(&tid, &stub).await {
                    error!(transaction_id = %tid, uuid = %stub.uuid, error = %err, "document export failed");
                    job.record_failure(stub.uuid).await;
                }
                drop(permit);
            });

            while workers.try_join_next().is_some() {}
        }

        while workers.join_next().await.is_some() {}
        let (failures, progress) = job.mark_finished().await;
        info!(job_id = %job.id(), failures, progress, "job finished");
    }
}
