//! Publication-event mapping.
//!
//! Turns raw broker messages into typed notifications, applying the skip
//! rules on the way: synthetic transaction ids, URIs outside the whitelist,
//! and content flagged as non-distributable all yield `Ok(None)`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::content::{date_or_default, Stub, DEFAULT_DATE};
use crate::error::MapError;

use super::message::BrokerMessage;
use super::notification::{EventType, Notification};

/// Transaction ids with this prefix mark synthetic monitoring traffic.
pub const SYNTHETIC_TID_PREFIX: &str = "SYNTH";

const CAN_BE_DISTRIBUTED_YES: &str = "yes";

static UUID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{12}")
        .expect("uuid regex pattern is invalid - this is a bug")
});

/// Publication event as found on the wire.
#[derive(Debug, Deserialize)]
pub struct PublicationEvent {
    #[serde(rename = "contentURI", default)]
    pub content_uri: String,

    /// Absent and `null` both land on `None`; the variants cover the rest.
    #[serde(default)]
    pub payload: Option<EventPayload>,

    #[serde(rename = "lastModified", default)]
    pub last_modified: Option<String>,
}

/// The payload field is a sum of shapes; emptiness decides DELETE vs UPDATE.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Text(String),
    Document(Map<String, Value>),
    Other(Value),
}

impl PublicationEvent {
    pub fn has_empty_payload(&self) -> bool {
        match &self.payload {
            None => true,
            Some(EventPayload::Text(text)) => text.is_empty(),
            Some(EventPayload::Document(fields)) => fields.is_empty(),
            Some(EventPayload::Other(value)) => value.is_null(),
        }
    }

    fn payload_document(&self) -> Option<&Map<String, Value>> {
        match &self.payload {
            Some(EventPayload::Document(fields)) => Some(fields),
            _ => None,
        }
    }
}

/// Maps broker messages to notifications.
pub struct MessageMapper {
    whitelist: Regex,
}

impl MessageMapper {
    pub fn new(whitelist: Regex) -> Self {
        Self { whitelist }
    }

    /// `Ok(None)` is a skip, not an error.
    pub fn map(&self, message: &BrokerMessage) -> Result<Option<Notification>, MapError> {
        let tid = message.transaction_id();

        let event: PublicationEvent = match serde_json::from_str(&message.body) {
            Ok(event) => event,
            Err(err) => {
                warn!(transaction_id = tid, body = %message.body, error = %err, "skipping event");
                return Err(err.into());
            }
        };

        if tid.starts_with(SYNTHETIC_TID_PREFIX) {
            info!(
                transaction_id = tid,
                content_uri = %event.content_uri,
                "skipping event: synthetic transaction id"
            );
            return Ok(None);
        }

        if !self.whitelist.is_match(&event.content_uri) {
            info!(
                transaction_id = tid,
                content_uri = %event.content_uri,
                "skipping event: not in the whitelist"
            );
            return Ok(None);
        }

        let Some(found) = UUID_REGEX.find(&event.content_uri) else {
            warn!(
                transaction_id = tid,
                content_uri = %event.content_uri,
                "skipping event: cannot build notification for message"
            );
            return Err(MapError::NoUuid);
        };
        let uuid = found.as_str().to_lowercase();

        let (event_type, payload_fields) = if event.has_empty_payload() {
            (EventType::Delete, None)
        } else {
            (EventType::Update, event.payload_document())
        };

        let date = payload_fields
            .map(date_or_default)
            .unwrap_or_else(|| DEFAULT_DATE.to_string());
        let can_be_distributed = payload_fields
            .and_then(|fields| fields.get("canBeDistributed"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(flag) = &can_be_distributed {
            if flag != CAN_BE_DISTRIBUTED_YES {
                warn!(
                    transaction_id = tid,
                    uuid = %uuid,
                    "skipping event: content cannot be distributed"
                );
                return Ok(None);
            }
        }

        Ok(Some(Notification {
            stub: Stub {
                uuid,
                date,
                can_be_distributed,
            },
            event_type,
            tid: tid.to_string(),
            quit: CancellationToken::new(),
        }))
    }
}
