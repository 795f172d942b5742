//! Stub identity and publish-date derivation.

use serde_json::{Map, Value};

/// Sentinel used when a document carries no usable publish date.
pub const DEFAULT_DATE: &str = "0000-00-00";

/// Minimal identity of one document in flight.
///
/// Created by the inquirer (bulk) or the message mapper (incremental) and
/// destroyed when the enclosing job or notification completes. `uuid` is
/// always the canonical lowercase 8-4-4-4-12 form; `date` is either
/// `YYYY-MM-DD` or [`DEFAULT_DATE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stub {
    pub uuid: String,
    pub date: String,
    /// Distribution flag as found on the document: absent, "yes", or
    /// anything else (which blocks distribution).
    pub can_be_distributed: Option<String>,
}

impl Stub {
    pub fn new(uuid: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            date: date.into(),
            can_be_distributed: None,
        }
    }
}

/// Derive the publish date from a document's fields.
///
/// `firstPublishedDate` wins over `publishedDate`; each value is truncated
/// at the first `T` to keep the ISO-8601 date portion. Falls back to
/// [`DEFAULT_DATE`] when neither field yields a non-empty date.
pub fn date_or_default(fields: &Map<String, Value>) -> String {
    for field in ["firstPublishedDate", "publishedDate"] {
        if let Some(raw) = fields.get(field).and_then(Value::as_str) {
            let date = raw.split('T').next().unwrap_or_default();
            if !date.is_empty() {
                return date.to_string();
            }
        }
    }
    DEFAULT_DATE.to_string()
}
