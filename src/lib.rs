//! content-exporter - ships articles from the document store to a blob store
//!
//! # Architecture
//!
//! ```text
//! bulk:        POST /export ──▶ Locker ──▶ Inquirer ──▶ FullExporter ─┐
//!                                  │         (store)     (worker pool) │
//!                                  ▼                                   ▼
//! incremental: Broker ──▶ MessageListener ──▶ NotificationHandler ──▶ ContentExporter
//!                          (pause/drain)       (delay, cancel)         (GET then PUT/DELETE)
//! ```
//!
//! The two flows share the per-document pipeline and are serialised by the
//! lock handshake: a bulk job pauses the incremental listener for its whole
//! run. The document-store driver and the broker client are collaborator
//! seams ([`store::DocumentStore`], [`queue::MessageSource`]); in-memory
//! implementations of both ship with the crate.
//!
//! # Usage
//!
//! ```rust,ignore
//! use content_exporter::{locker, AppConfig, AppState, FullExporter};
//!
//! let config = AppConfig::from_file("exporter.yaml")?;
//! let (bulk_lock, lock_signals) = locker();
//! // wire fetcher, writer, store and broker seams, then:
//! let app = content_exporter::web::router(state);
//! content_exporter::web::serve(listener, app, shutdown).await?;
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod export;
pub mod health;
pub mod queue;
pub mod store;
pub mod web;

pub use config::AppConfig;
pub use content::{
    BlobWriter, ContentExporter, EnrichedContentFetcher, Fetcher, HttpClient, RetryPolicy, Stub,
    Updater, DEFAULT_DATE,
};
pub use error::{
    ConfigError, ContentError, ExportError, JobError, LockError, MapError, NotificationError,
    QueueError, StoreError,
};
pub use export::{locker, FullExporter, Job, JobSnapshot, JobStatus, LockSignals, Locker};
pub use health::{CheckOutcome, HealthChecker, HealthService};
pub use queue::{
    BrokerMessage, ContentNotificationHandler, EventType, MemoryMessageSource, MessageListener,
    MessageMapper, MessageSource, Notification, NotificationHandler,
};
pub use store::{
    DocumentStore, Inquirer, MemoryDocumentStore, StoreInquirer, StubQuery,
};
pub use web::AppState;
