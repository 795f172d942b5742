//! Broker message seam.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::QueueError;

pub use crate::content::TRANSACTION_ID_HEADER;

const DELIVERY_DEPTH: usize = 16;

/// One message as delivered by the broker bridge.
#[derive(Debug, Clone, Default)]
pub struct BrokerMessage {
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl BrokerMessage {
    pub fn new(body: impl Into<String>, tid: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert(TRANSACTION_ID_HEADER.to_string(), tid.into());
        Self {
            headers,
            body: body.into(),
        }
    }

    pub fn transaction_id(&self) -> &str {
        self.headers
            .get(TRANSACTION_ID_HEADER)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Push-style source of broker messages.
///
/// `subscribe` may be called once per listener run; delivery ends when the
/// source is shut down, which closes the subscription channel.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn subscribe(&self) -> Result<mpsc::Receiver<BrokerMessage>, QueueError>;

    /// Stop delivery and close the subscription channel.
    async fn shutdown(&self);

    /// Connectivity probe for the health surface.
    async fn connectivity_check(&self) -> Result<String, QueueError>;
}

/// In-memory message source for tests and embeddings without a broker.
pub struct MemoryMessageSource {
    sender: Mutex<Option<mpsc::Sender<BrokerMessage>>>,
    receiver: Mutex<Option<mpsc::Receiver<BrokerMessage>>>,
}

impl Default for MemoryMessageSource {
    fn default() -> Self {
        let (tx, rx) = mpsc::channel(DELIVERY_DEPTH);
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
        }
    }
}

impl MemoryMessageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to the subscriber, waiting for channel space.
    pub async fn publish(&self, message: BrokerMessage) -> Result<(), QueueError> {
        let sender = self.sender.lock().await;
        match sender.as_ref() {
            Some(tx) => tx
                .send(message)
                .await
                .map_err(|_| QueueError::Shutdown),
            None => Err(QueueError::Shutdown),
        }
    }
}

#[async_trait]
impl MessageSource for MemoryMessageSource {
    async fn subscribe(&self) -> Result<mpsc::Receiver<BrokerMessage>, QueueError> {
        self.receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| QueueError::Unavailable("already subscribed".to_string()))
    }

    async fn shutdown(&self) {
        self.sender.lock().await.take();
    }

    async fn connectivity_check(&self) -> Result<String, QueueError> {
        if self.sender.lock().await.is_some() {
            Ok("Message queue is good to go.".to_string())
        } else {
            Err(QueueError::Shutdown)
        }
    }
}
