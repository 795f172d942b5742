//! Cursor-backed stub producer.
//!
//! `inquire` opens a transaction, counts the matches, and hands the cursor
//! to a dedicated driver task that feeds a small channel. The channel depth
//! propagates consumer backpressure to the store; the driver drops the
//! cursor and transaction on exhaustion, on receiver drop, and on any
//! iteration error.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::content::{date_or_default, Stub};
use crate::error::StoreError;

use super::query::StubQuery;
use super::{Document, DocumentStore};

/// Stub channel depth.
pub const STREAM_DEPTH: usize = 8;

/// Produces the finite, single-pass stub stream for one bulk export.
#[async_trait]
pub trait Inquirer: Send + Sync {
    /// On success the returned stream is unstarted and the count is the
    /// cursor's approximate match count; on failure no stream exists and
    /// the store session has already been released.
    async fn inquire(
        &self,
        collection: &str,
        candidates: Vec<String>,
    ) -> Result<(mpsc::Receiver<Stub>, usize), StoreError>;
}

pub struct StoreInquirer {
    store: Arc<dyn DocumentStore>,
}

impl StoreInquirer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Inquirer for StoreInquirer {
    async fn inquire(
        &self,
        collection: &str,
        candidates: Vec<String>,
    ) -> Result<(mpsc::Receiver<Stub>, usize), StoreError> {
        let mut tx = self.store.open().await?;
        let query = StubQuery::new(candidates);
        // A query failure drops the transaction before returning.
        let (mut cursor, count) = tx.find_stub_documents(collection, &query).await?;

        let (stub_tx, stub_rx) = mpsc::channel(STREAM_DEPTH);
        tokio::spawn(async move {
            let mut processed = 0usize;
            loop {
                match cursor.try_next().await {
                    Ok(Some(doc)) => {
                        processed += 1;
                        let Some(stub) = map_stub(&doc) else {
                            warn!("no uuid field in cursor document, skipping");
                            continue;
                        };
                        if stub_tx.send(stub).await.is_err() {
                            debug!("stub receiver dropped, closing the cursor early");
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "cursor failed mid-stream");
                        break;
                    }
                }
            }
            info!(processed, "document inquiry drained");
            drop(cursor);
            drop(tx);
        });

        Ok((stub_rx, count))
    }
}

fn map_stub(doc: &Document) -> Option<Stub> {
    let fields = doc.as_object()?;
    let uuid = fields.get("uuid")?.as_str()?;
    Some(Stub::new(uuid, date_or_default(fields)))
}
