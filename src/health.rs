//! Health surface: named checks, `/__health` and `/__gtg`.
//!
//! Each check probes one collaborator and reports an operator-facing
//! outcome; the good-to-go endpoint short-circuits on the first failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::content::{Fetcher, Updater};
use crate::queue::MessageSource;
use crate::store::DocumentStore;

pub const HEALTH_PATH: &str = "/__health";
pub const GTG_PATH: &str = "/__gtg";

const STORE_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of one health probe.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub ok: bool,
    pub output: String,
}

impl CheckOutcome {
    pub fn healthy(output: impl Into<String>) -> Self {
        Self {
            ok: true,
            output: output.into(),
        }
    }

    pub fn unhealthy(output: impl Into<String>) -> Self {
        Self {
            ok: false,
            output: output.into(),
        }
    }
}

#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self) -> CheckOutcome;
}

struct HealthCheck {
    name: &'static str,
    technical_summary: &'static str,
    checker: Arc<dyn HealthChecker>,
}

/// Aggregates the service's health checks behind the two endpoints.
pub struct HealthService {
    system_code: String,
    name: String,
    description: String,
    checks: Vec<HealthCheck>,
}

impl HealthService {
    pub fn new(
        system_code: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            system_code: system_code.into(),
            name: name.into(),
            description: description.into(),
            checks: Vec::new(),
        }
    }

    pub fn with_check(
        mut self,
        name: &'static str,
        technical_summary: &'static str,
        checker: Arc<dyn HealthChecker>,
    ) -> Self {
        self.checks.push(HealthCheck {
            name,
            technical_summary,
            checker,
        });
        self
    }

    pub fn with_store_check(self, store: Arc<dyn DocumentStore>) -> Self {
        self.with_check(
            "CheckConnectivityToDocumentStore",
            "The service cannot connect to the document store; bulk export will not work",
            Arc::new(StoreCheck { store }),
        )
    }

    pub fn with_fetcher_check(self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.with_check(
            "CheckConnectivityToEnrichedContent",
            "The service cannot connect to the enriched-content endpoint; neither bulk nor incremental export will work",
            Arc::new(FetcherCheck { fetcher }),
        )
    }

    pub fn with_writer_check(self, updater: Arc<dyn Updater>) -> Self {
        self.with_check(
            "CheckConnectivityToBlobWriter",
            "The service cannot connect to the blob writer; neither bulk nor incremental export will work",
            Arc::new(WriterCheck { updater }),
        )
    }

    pub fn with_queue_check(self, source: Arc<dyn MessageSource>) -> Self {
        self.with_check(
            "CheckConnectivityToMessageQueue",
            "The service cannot connect to the message queue; incremental export will not work",
            Arc::new(QueueCheck { source }),
        )
    }

    pub fn router(self) -> Router {
        let service = Arc::new(self);
        Router::new()
            .route(HEALTH_PATH, get(health))
            .route(GTG_PATH, get(gtg))
            .with_state(service)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    system_code: String,
    name: String,
    description: String,
    ok: bool,
    checks: Vec<CheckReport>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
    name: &'static str,
    ok: bool,
    check_output: String,
    technical_summary: &'static str,
}

async fn health(State(service): State<Arc<HealthService>>) -> Json<HealthReport> {
    let mut checks = Vec::with_capacity(service.checks.len());
    let mut ok = true;
    for check in &service.checks {
        let outcome = check.checker.check().await;
        ok &= outcome.ok;
        checks.push(CheckReport {
            name: check.name,
            ok: outcome.ok,
            check_output: outcome.output,
            technical_summary: check.technical_summary,
        });
    }
    Json(HealthReport {
        system_code: service.system_code.clone(),
        name: service.name.clone(),
        description: service.description.clone(),
        ok,
        checks,
    })
}

async fn gtg(State(service): State<Arc<HealthService>>) -> (StatusCode, String) {
    for check in &service.checks {
        let outcome = check.checker.check().await;
        if !outcome.ok {
            return (StatusCode::SERVICE_UNAVAILABLE, outcome.output);
        }
    }
    (StatusCode::OK, "OK".to_string())
}

struct StoreCheck {
    store: Arc<dyn DocumentStore>,
}

#[async_trait]
impl HealthChecker for StoreCheck {
    async fn check(&self) -> CheckOutcome {
        let probe = async {
            let tx = self.store.open().await?;
            tx.ping().await
        };
        match tokio::time::timeout(STORE_PROBE_TIMEOUT, probe).await {
            Ok(Ok(())) => CheckOutcome::healthy("OK"),
            Ok(Err(err)) => CheckOutcome::unhealthy(err.to_string()),
            Err(_) => CheckOutcome::unhealthy("store ping timed out"),
        }
    }
}

struct FetcherCheck {
    fetcher: Arc<dyn Fetcher>,
}

#[async_trait]
impl HealthChecker for FetcherCheck {
    async fn check(&self) -> CheckOutcome {
        match self.fetcher.check_health().await {
            Ok(message) => CheckOutcome::healthy(message),
            Err(err) => CheckOutcome::unhealthy(err.to_string()),
        }
    }
}

struct WriterCheck {
    updater: Arc<dyn Updater>,
}

#[async_trait]
impl HealthChecker for WriterCheck {
    async fn check(&self) -> CheckOutcome {
        match self.updater.check_health().await {
            Ok(message) => CheckOutcome::healthy(message),
            Err(err) => CheckOutcome::unhealthy(err.to_string()),
        }
    }
}

struct QueueCheck {
    source: Arc<dyn MessageSource>,
}

#[async_trait]
impl HealthChecker for QueueCheck {
    async fn check(&self) -> CheckOutcome {
        match self.source.connectivity_check().await {
            Ok(message) => CheckOutcome::healthy(message),
            Err(err) => CheckOutcome::unhealthy(err.to_string()),
        }
    }
}
