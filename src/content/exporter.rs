//! Per-document export pipeline.

use std::sync::Arc;

use tracing::warn;

use crate::error::{ContentError, ExportError};

use super::fetcher::Fetcher;
use super::stub::Stub;
use super::updater::Updater;

/// Composes fetch and upload for a single stub.
///
/// Exactly one GET and at most one PUT per call, in that order; the fetched
/// payload is forwarded verbatim.
pub struct ContentExporter {
    fetcher: Arc<dyn Fetcher>,
    updater: Arc<dyn Updater>,
}

impl ContentExporter {
    pub fn new(fetcher: Arc<dyn Fetcher>, updater: Arc<dyn Updater>) -> Self {
        Self { fetcher, updater }
    }

    /// Enrich and upload one document.
    pub async fn handle(&self, tid: &str, stub: &Stub) -> Result<(), ExportError> {
        let payload = self
            .fetcher
            .get_content(&stub.uuid, tid)
            .await
            .map_err(|source| ExportError::GetContent {
                uuid: stub.uuid.clone(),
                source,
            })?;

        self.updater
            .upload(payload, tid, &stub.uuid, &stub.date)
            .await
            .map_err(|source| ExportError::UploadContent {
                uuid: stub.uuid.clone(),
                source,
            })
    }

    /// Remove one document from the blob store.
    ///
    /// A missing blob is not a failure: the content is already gone, so the
    /// outcome is logged and absorbed.
    pub async fn handle_delete(&self, tid: &str, uuid: &str) -> Result<(), ContentError> {
        match self.updater.delete(uuid, tid).await {
            Err(err) if err.is_not_found() => {
                warn!(
                    transaction_id = tid,
                    uuid, "content was already absent from the blob store"
                );
                Ok(())
            }
            other => other,
        }
    }
}
