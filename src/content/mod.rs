//! Document identity and the enrich-and-upload pipeline.
//!
//! `Stub` is the minimal identity of one document in flight. The `Fetcher`
//! pulls the enriched payload for a stub, the `Updater` writes it to (or
//! removes it from) the blob store, and `ContentExporter` composes the two
//! into the per-document pipeline shared by bulk jobs and incremental
//! notifications.

mod client;
mod exporter;
mod fetcher;
mod stub;
mod updater;

pub use client::{HttpClient, RetryPolicy, TRANSACTION_ID_HEADER, USER_AGENT};
pub use exporter::ContentExporter;
pub use fetcher::{EnrichedContentFetcher, Fetcher};
pub use stub::{date_or_default, Stub, DEFAULT_DATE};
pub use updater::{BlobWriter, Updater};
