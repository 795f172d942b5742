//! Per-notification state machine.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::content::{ContentExporter, Stub};
use crate::error::NotificationError;

/// Kind of publication event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Update,
    Delete,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// One incremental event in flight.
///
/// The `quit` token is the notification's own cancel channel: cancelling it
/// releases a pending delay-wait immediately.
#[derive(Debug, Clone)]
pub struct Notification {
    pub stub: Stub,
    pub event_type: EventType,
    pub tid: String,
    pub quit: CancellationToken,
}

/// Handles one mapped notification to completion.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Drives the content pipeline for one notification.
///
/// UPDATE waits the configured delay (so fast follow-up deletes win the
/// race against slow enrichment) unless cancelled; DELETE forwards straight
/// to the pipeline.
pub struct ContentNotificationHandler {
    exporter: Arc<ContentExporter>,
    delay: Duration,
}

impl ContentNotificationHandler {
    pub fn new(exporter: Arc<ContentExporter>, delay: Duration) -> Self {
        Self { exporter, delay }
    }
}

#[async_trait]
impl NotificationHandler for ContentNotificationHandler {
    async fn handle(&self, notification: &Notification) -> Result<(), NotificationError> {
        match notification.event_type {
            EventType::Update => {
                info!(
                    transaction_id = %notification.tid,
                    uuid = %notification.stub.uuid,
                    delay_secs = self.delay.as_secs(),
                    "UPDATE event received, waiting configured delay"
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = notification.quit.cancelled() => {
                        return Err(NotificationError::Shutdown);
                    }
                }
                self.exporter
                    .handle(&notification.tid, &notification.stub)
                    .await
                    .map_err(NotificationError::Update)
            }
            EventType::Delete => {
                info!(
                    transaction_id = %notification.tid,
                    uuid = %notification.stub.uuid,
                    "DELETE event received"
                );
                self.exporter
                    .handle_delete(&notification.tid, &notification.stub.uuid)
                    .await
                    .map_err(NotificationError::Delete)
            }
        }
    }
}
