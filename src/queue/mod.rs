//! Incremental export: publication events from the broker.
//!
//! The broker client is an external collaborator; it appears here as the
//! [`MessageSource`] seam. Messages flow through the mapper (filtering and
//! classification), become notifications, and are dispatched to bounded
//! workers by the listener, which also coordinates the bulk-export lock.

mod listener;
mod mapper;
mod message;
mod notification;

pub use listener::{MessageListener, PAUSE_POLL_INTERVAL};
pub use mapper::{EventPayload, MessageMapper, PublicationEvent, SYNTHETIC_TID_PREFIX};
pub use message::{BrokerMessage, MemoryMessageSource, MessageSource, TRANSACTION_ID_HEADER};
pub use notification::{
    ContentNotificationHandler, EventType, Notification, NotificationHandler,
};
