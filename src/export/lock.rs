//! Bulk↔incremental lock: a two-channel rendezvous.
//!
//! The bulk initiator sends `true` on the `locked` channel and waits for
//! the acknowledgement; the incremental listener observes the signal,
//! pauses, and acks. On completion the initiator sends `false` and the
//! listener resumes. The lock is not reentrant and has no owning identity;
//! concurrent bulk requests are rejected by the job registry's
//! already-running check, not here.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::error::LockError;

/// Initiator-side timeout for placing the lock signal.
pub const LOCK_INITIATE_TIMEOUT: Duration = Duration::from_secs(3);

/// Initiator-side timeout for the listener's acknowledgement.
pub const LOCK_ACK_TIMEOUT: Duration = Duration::from_secs(20);

/// Bulk side of the lock.
pub struct Locker {
    locked_tx: mpsc::Sender<bool>,
    acked_rx: Mutex<mpsc::Receiver<()>>,
}

/// Incremental side of the lock, consumed by the listener coordinator.
pub struct LockSignals {
    pub locked: mpsc::Receiver<bool>,
    pub acked: mpsc::Sender<()>,
}

/// Create a connected lock pair.
pub fn locker() -> (Locker, LockSignals) {
    let (locked_tx, locked_rx) = mpsc::channel(1);
    let (acked_tx, acked_rx) = mpsc::channel(1);
    (
        Locker {
            locked_tx,
            acked_rx: Mutex::new(acked_rx),
        },
        LockSignals {
            locked: locked_rx,
            acked: acked_tx,
        },
    )
}

impl Locker {
    /// Signal the incremental side to pause.
    pub async fn lock(&self) -> Result<(), LockError> {
        self.locked_tx
            .send_timeout(true, LOCK_INITIATE_TIMEOUT)
            .await
            .map_err(|err| match err {
                mpsc::error::SendTimeoutError::Timeout(_) => LockError::InitiateTimeout,
                mpsc::error::SendTimeoutError::Closed(_) => LockError::Closed,
            })
    }

    /// Wait for the incremental side to confirm it has paused.
    pub async fn await_ack(&self) -> Result<(), LockError> {
        let mut acked = self.acked_rx.lock().await;
        match tokio::time::timeout(LOCK_ACK_TIMEOUT, acked.recv()).await {
            Ok(Some(())) => Ok(()),
            Ok(None) => Err(LockError::Closed),
            Err(_) => Err(LockError::AckTimeout),
        }
    }

    /// Release the lock; the incremental side resumes on observing it.
    pub async fn unlock(&self) {
        if self.locked_tx.send(false).await.is_err() {
            warn!("lock observer is gone, nothing to release");
        }
    }
}
