//! Broker listener: admission, bounded dispatch, pause/resume, drain.
//!
//! Three tasks cooperate per run. The admission task pulls raw messages,
//! maps them, registers the resulting notifications as pending and feeds a
//! capacity-1 channel. The dispatch task drains that channel into workers
//! bounded by a semaphore. The coordinator reacts to lock signals from the
//! bulk side and to the quit token, and owns the shutdown sequence: mark
//! shutdown as prepared, cancel every pending notification, stop the
//! source, then wait for admission and dispatch to quiesce.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::QueueError;
use crate::export::LockSignals;

use super::mapper::MessageMapper;
use super::message::{BrokerMessage, MessageSource};
use super::notification::{Notification, NotificationHandler};

/// How often a paused loop re-checks the pause flag.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Listener-side timeout for acknowledging a lock signal.
const LOCK_ACK_TIMEOUT: Duration = Duration::from_secs(3);

const RECEIVED_DEPTH: usize = 1;
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct MessageListener {
    source: Arc<dyn MessageSource>,
    mapper: MessageMapper,
    handler: Arc<dyn NotificationHandler>,
    max_in_flight: usize,
    paused: AtomicBool,
    shutdown_prepared: AtomicBool,
    shut_down: AtomicBool,
    pending: Mutex<HashMap<String, CancellationToken>>,
    quit: CancellationToken,
}

impl MessageListener {
    pub fn new(
        source: Arc<dyn MessageSource>,
        mapper: MessageMapper,
        handler: Arc<dyn NotificationHandler>,
        max_in_flight: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            mapper,
            handler,
            max_in_flight,
            paused: AtomicBool::new(false),
            shutdown_prepared: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            quit: CancellationToken::new(),
        })
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Relaxed)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn check_health(&self) -> Result<String, QueueError> {
        self.source.connectivity_check().await
    }

    /// Consume messages until stopped. Returns once the drain is complete.
    pub async fn run(self: Arc<Self>, mut lock_signals: LockSignals) {
        let messages = match self.source.subscribe().await {
            Ok(messages) => messages,
            Err(err) => {
                error!(error = %err, "cannot subscribe to the message source");
                self.shut_down.store(true, Ordering::Relaxed);
                return;
            }
        };

        let (received_tx, received_rx) = mpsc::channel(RECEIVED_DEPTH);
        let admission = tokio::spawn(self.clone().admission_loop(messages, received_tx));
        let dispatch = tokio::spawn(self.clone().dispatch_loop(received_rx));

        loop {
            tokio::select! {
                signal = lock_signals.locked.recv() => match signal {
                    Some(true) => {
                        info!("LOCK signal received: pausing consumption");
                        self.paused.store(true, Ordering::Relaxed);
                        match lock_signals.acked.send_timeout((), LOCK_ACK_TIMEOUT).await {
                            Ok(()) => info!("LOCK acked"),
                            Err(_) => warn!("LOCK acking timed out, maybe the initiator quit already"),
                        }
                    }
                    Some(false) => {
                        info!("LOCK signal received: resuming consumption");
                        self.paused.store(false, Ordering::Relaxed);
                    }
                    None => {
                        // The bulk side is gone; only quit can end the run now.
                        self.quit.cancelled().await;
                        info!("QUIT signal received");
                        break;
                    }
                },
                _ = self.quit.cancelled() => {
                    info!("QUIT signal received");
                    break;
                }
            }
        }

        self.shutdown_prepared.store(true, Ordering::Relaxed);
        self.terminate_pending().await;
        self.source.shutdown().await;
        let _ = admission.await;
        let _ = dispatch.await;
        self.shut_down.store(true, Ordering::Relaxed);
    }

    /// Signal the listener to drain and wait until it has terminated.
    pub async fn stop(&self) {
        self.quit.cancel();
        while !self.is_shut_down() {
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
    }

    async fn admission_loop(
        self: Arc<Self>,
        mut messages: mpsc::Receiver<BrokerMessage>,
        received: mpsc::Sender<Notification>,
    ) {
        while let Some(message) = messages.recv().await {
            if self.shutdown_prepared.load(Ordering::Relaxed) {
                return;
            }

            let tid = message.transaction_id().to_string();
            if self.is_paused() {
                info!(transaction_id = %tid, "PAUSED handling message");
                while self.is_paused() {
                    if self.shutdown_prepared.load(Ordering::Relaxed) {
                        return;
                    }
                    tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
                }
                info!(transaction_id = %tid, "PAUSE finished, resuming message handling");
            }

            let notification = match self.mapper.map(&message) {
                Ok(Some(notification)) => notification,
                // Skips and mapping failures are already logged by the mapper.
                Ok(None) | Err(_) => continue,
            };

            self.pending
                .lock()
                .await
                .insert(notification.tid.clone(), notification.quit.clone());

            let quit = notification.quit.clone();
            let notification_tid = notification.tid.clone();
            tokio::select! {
                sent = received.send(notification) => {
                    if sent.is_err() {
                        return;
                    }
                }
                _ = quit.cancelled() => {
                    // Drained during admission; never reaches a worker.
                    self.pending.lock().await.remove(&notification_tid);
                }
            }
        }
    }

    async fn dispatch_loop(self: Arc<Self>, mut received: mpsc::Receiver<Notification>) {
        info!("started handling notifications");
        let slots = Arc::new(Semaphore::new(self.max_in_flight));
        let mut workers = JoinSet::new();

        while let Some(notification) = received.recv().await {
            // No new dispatch while the bulk side holds the lock.
            while self.is_paused() && !self.shutdown_prepared.load(Ordering::Relaxed) {
                tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
            }

            let Ok(permit) = slots.clone().acquire_owned().await else {
                break;
            };
            let listener = self.clone();
            workers.spawn(async move {
                if let Err(err) = listener.handler.handle(&notification).await {
                    if err.is_shutdown() {
                        info!(
                            transaction_id = %notification.tid,
                            uuid = %notification.stub.uuid,
                            "notification cancelled during delay wait"
                        );
                    } else {
                        error!(
                            transaction_id = %notification.tid,
                            uuid = %notification.stub.uuid,
                            error = %err,
                            "failed notification handling"
                        );
                    }
                }
                listener.pending.lock().await.remove(&notification.tid);
                drop(permit);
            });

            while workers.try_join_next().is_some() {}
        }

        while workers.join_next().await.is_some() {}
        info!("stopped handling notifications");
    }

    async fn terminate_pending(&self) {
        let pending = self.pending.lock().await;
        for quit in pending.values() {
            quit.cancel();
        }
    }
}
