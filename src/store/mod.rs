//! Document-store seam.
//!
//! The real driver lives outside this crate; the exporter only needs a
//! transaction that can count and iterate matching documents. Exactly one
//! inquiry driver task holds a transaction at a time, and dropping the
//! transaction (or its cursor) releases the underlying resources.

mod inquirer;
mod memory;
mod query;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

pub use inquirer::{Inquirer, StoreInquirer, STREAM_DEPTH};
pub use memory::MemoryDocumentStore;
pub use query::{StubQuery, BATCH_SIZE};

/// One document as returned by the store, projected to the stub fields.
pub type Document = Value;

/// Opens transactions against the authoritative document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn open(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// A single store session. Dropping it releases the session.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    /// Run the stub query against a collection, returning an unstarted
    /// cursor and the approximate match count taken before iteration.
    async fn find_stub_documents(
        &mut self,
        collection: &str,
        query: &StubQuery,
    ) -> Result<(Box<dyn DocumentCursor>, usize), StoreError>;

    /// Connectivity probe; callers bound it with their own timeout.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Server-side iterator over query results. Dropping it closes the cursor.
#[async_trait]
pub trait DocumentCursor: Send + Sync {
    /// Next projected document, or `None` once exhausted.
    async fn try_next(&mut self) -> Result<Option<Document>, StoreError>;
}
