//! Best-effort notification delivery.
//!
//! Committed booking and payment transitions enqueue an [`OutboxEntry`];
//! delivery to the [`NotificationSink`] happens later in
//! [`NotificationEmitter::dispatch_pending`]. A sink failure is logged and
//! retried, and never reaches the code that committed the transition.

use crate::clients::NotificationSink;
use crate::error::{BookingError, Result};
use crate::models::{Notification, NotificationKind, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Notification waiting to be delivered
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub recipient_id: String,
    pub message: String,
    pub kind: NotificationKind,
    pub attempts: u32,
}

/// Result of one dispatch round
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub retried: usize,
    pub dropped: usize,
}

pub struct NotificationEmitter {
    sink: Arc<dyn NotificationSink>,
    tx: mpsc::UnboundedSender<OutboxEntry>,
    rx: Mutex<mpsc::UnboundedReceiver<OutboxEntry>>,
    wake: Notify,
    max_attempts: u32,
}

impl NotificationEmitter {
    pub fn new(sink: Arc<dyn NotificationSink>, max_attempts: u32) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sink,
            tx,
            rx: Mutex::new(rx),
            wake: Notify::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Queue a notification. Never fails the caller.
    pub fn emit(&self, recipient_id: &str, message: impl Into<String>, kind: NotificationKind) {
        let entry = OutboxEntry {
            recipient_id: recipient_id.to_string(),
            message: message.into(),
            kind,
            attempts: 0,
        };
        self.enqueue(entry);
        self.wake.notify_one();
    }

    fn enqueue(&self, entry: OutboxEntry) {
        // the receiver lives as long as self, so this only fails during teardown
        if let Err(err) = self.tx.send(entry) {
            warn!(recipient = %err.0.recipient_id, "Notification outbox closed, dropping entry");
        }
    }

    /// Deliver everything queued so far
    pub async fn dispatch_pending(&self) -> DispatchReport {
        let batch = {
            let mut rx = self.rx.lock().await;
            let mut batch = Vec::new();
            while let Ok(entry) = rx.try_recv() {
                batch.push(entry);
            }
            batch
        };

        let mut report = DispatchReport::default();
        for mut entry in batch {
            match self
                .sink
                .push(&entry.recipient_id, &entry.message, entry.kind)
                .await
            {
                Ok(notification) => {
                    debug!(
                        recipient = %entry.recipient_id,
                        notification_id = %notification.id,
                        "Notification delivered"
                    );
                    report.delivered += 1;
                }
                Err(err) => {
                    entry.attempts += 1;
                    if entry.attempts >= self.max_attempts {
                        warn!(
                            recipient = %entry.recipient_id,
                            attempts = entry.attempts,
                            error = %err,
                            "Giving up on notification"
                        );
                        report.dropped += 1;
                    } else {
                        warn!(
                            recipient = %entry.recipient_id,
                            attempts = entry.attempts,
                            error = %err,
                            "Notification delivery failed, will retry"
                        );
                        self.enqueue(entry);
                        report.retried += 1;
                    }
                }
            }
        }

        report
    }

    /// Run `dispatch_pending` on a timer and whenever something is emitted.
    /// Abort the returned handle to stop.
    pub fn spawn_dispatcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let emitter = Arc::clone(self);
        tokio::spawn(async move {
            info!("📬 Notification dispatcher started");
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = emitter.wake.notified() => {}
                }
                emitter.dispatch_pending().await;
            }
        })
    }

    /// The caller's notifications, newest first
    pub async fn list(&self, session: &Session) -> Result<Vec<Notification>> {
        let mut notifications = self.sink.list(&session.user_id).await?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    pub async fn unseen_count(&self, session: &Session) -> Result<usize> {
        let notifications = self.sink.list(&session.user_id).await?;
        Ok(notifications.iter().filter(|n| !n.seen).count())
    }

    /// Only the recipient may mark a notification; others get `NotFound`
    pub async fn mark_seen(&self, session: &Session, notification_id: &str) -> Result<()> {
        let owned = self
            .sink
            .list(&session.user_id)
            .await?
            .into_iter()
            .any(|n| n.id == notification_id);
        if !owned {
            return Err(BookingError::NotFound(format!(
                "notification {notification_id}"
            )));
        }
        self.sink.mark_seen(notification_id).await
    }
}
