//! Error types for the content exporter.
//!
//! Each failure domain gets its own enum: talking to the upstream HTTP
//! collaborators, composing the per-document pipeline, handling one
//! notification, mapping broker messages, querying the document store, and
//! looking up jobs. Per-document and per-notification errors are recorded
//! (failed list, log line), never propagated past their job or handler.

use thiserror::Error;

/// Errors from the enriched-content endpoint and the blob writer.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Network-level failure before a status code was obtained.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with an unexpected status code.
    #[error("{}", render_upstream(*status, message.as_deref()))]
    UpstreamStatus {
        status: u16,
        message: Option<String>,
    },

    /// The enrichment endpoint refused the document (HTTP 403).
    #[error("Access to content is forbidden. Skipping")]
    AccessDenied,

    /// The blob store has no entry for the document (HTTP 404 on delete).
    #[error("content not found in the blob store")]
    NotFound,
}

fn render_upstream(status: u16, message: Option<&str>) -> String {
    match message {
        Some(body) if !body.is_empty() => {
            format!("upstream returned HTTP {status} with message: {body}")
        }
        _ => format!("upstream returned HTTP {status}"),
    }
}

impl ContentError {
    /// Create an upstream-status error without a body.
    pub fn upstream(status: u16) -> Self {
        Self::UpstreamStatus {
            status,
            message: None,
        }
    }

    /// Create an upstream-status error carrying the response body.
    pub fn upstream_with_body(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::UpstreamStatus {
            status,
            message: if body.is_empty() { None } else { Some(body) },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied)
    }
}

/// Per-document failure of the enrich-and-upload pipeline.
///
/// The display formats are part of the job contract: operators read them
/// from handler logs and correlate them with the job's failed list.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Error getting content for {uuid}: {source}")]
    GetContent {
        uuid: String,
        #[source]
        source: ContentError,
    },

    #[error("Error uploading content for {uuid}: {source}")]
    UploadContent {
        uuid: String,
        #[source]
        source: ContentError,
    },
}

impl ExportError {
    pub fn uuid(&self) -> &str {
        match self {
            Self::GetContent { uuid, .. } | Self::UploadContent { uuid, .. } => uuid,
        }
    }
}

/// Failure of a single incremental notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The delay wait was aborted by shutdown or drain.
    #[error("Shutdown signalled, delay waiting for UPDATE event terminated abruptly")]
    Shutdown,

    #[error("UPDATE ERROR: {0}")]
    Update(#[source] ExportError),

    #[error("DELETE ERROR: {0}")]
    Delete(#[source] ContentError),
}

impl NotificationError {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

/// Failure to turn a broker message into a notification.
///
/// Skips (synthetic tid, whitelist miss, non-distributable content) are not
/// errors; the mapper returns `Ok(None)` for those.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("invalid publication event: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("contentURI does not contain a UUID")]
    NoUuid,
}

/// Document store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store transaction: {0}")]
    Open(String),

    #[error("failed to query the store: {0}")]
    Query(String),

    #[error("cursor failure: {0}")]
    Cursor(String),

    #[error("store ping failed: {0}")]
    Ping(String),
}

impl StoreError {
    pub fn open(msg: impl Into<String>) -> Self {
        Self::Open(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn cursor(msg: impl Into<String>) -> Self {
        Self::Cursor(msg.into())
    }

    pub fn ping(msg: impl Into<String>) -> Self {
        Self::Ping(msg.into())
    }
}

/// Message source failures.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("message source unavailable: {0}")]
    Unavailable(String),

    #[error("service is shutting down")]
    Shutdown,
}

/// Lock handshake failures between the bulk and incremental sides.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock initiation timed out")]
    InitiateTimeout,

    #[error("Stopping incremental export timed out")]
    AckTimeout,

    /// The incremental side dropped its half of the lock.
    #[error("lock observer is gone")]
    Closed,
}

/// Job registry failures.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job {0} not found")]
    NotFound(String),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
