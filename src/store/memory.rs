//! In-memory document store.
//!
//! Backs tests and embeddings that have no external store. Documents are
//! matched and projected with [`StubQuery`] the way a real driver would
//! evaluate the wire-form filter.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::StoreError;

use super::query::StubQuery;
use super::{Document, DocumentCursor, DocumentStore, StoreTransaction};

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    fail_open: AtomicBool,
    fail_query: AtomicBool,
    open_cursors: Arc<AtomicUsize>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, doc: Document) {
        self.collections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    /// Make the next (and every further) `open` fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::Relaxed);
    }

    /// Make queries fail after a transaction opens.
    pub fn set_fail_query(&self, fail: bool) {
        self.fail_query.store(fail, Ordering::Relaxed);
    }

    /// Number of cursors currently alive, for resource-release assertions.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn open(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        if self.fail_open.load(Ordering::Relaxed) {
            return Err(StoreError::open("memory store is offline"));
        }
        let snapshot = self
            .collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Ok(Box::new(MemoryTransaction {
            collections: snapshot,
            fail_query: self.fail_query.load(Ordering::Relaxed),
            open_cursors: self.open_cursors.clone(),
        }))
    }
}

struct MemoryTransaction {
    collections: HashMap<String, Vec<Document>>,
    fail_query: bool,
    open_cursors: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_stub_documents(
        &mut self,
        collection: &str,
        query: &StubQuery,
    ) -> Result<(Box<dyn DocumentCursor>, usize), StoreError> {
        if self.fail_query {
            return Err(StoreError::query("memory query failed"));
        }
        let matched: VecDeque<Document> = self
            .collections
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|doc| query.matches(doc))
            .map(|doc| query.project(doc))
            .collect();
        let count = matched.len();
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok((
            Box::new(MemoryCursor {
                documents: matched,
                open_cursors: self.open_cursors.clone(),
            }),
            count,
        ))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryCursor {
    documents: VecDeque<Document>,
    open_cursors: Arc<AtomicUsize>,
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn try_next(&mut self) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.pop_front())
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}
