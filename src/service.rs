use crate::clients::{Checkout, NotificationSink, PaymentGateway, PropertyDirectory};
use crate::config::AppConfig;
use crate::error::Result;
use crate::models::{Booking, Notification, PaymentAttempt, Session};
use crate::notifications::NotificationEmitter;
use crate::payments::{PaymentCoordinator, PaymentOutcome, PaymentSettings};
use crate::store::BookingStore;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// Entry point a client calls for every booking, payment and notification
/// operation. Each call carries the caller's session explicitly.
pub struct BookingService {
    store: Arc<BookingStore>,
    payments: PaymentCoordinator,
    emitter: Arc<NotificationEmitter>,
    dispatch_interval: Duration,
}

impl BookingService {
    pub fn new(
        config: &AppConfig,
        properties: Arc<dyn PropertyDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let emitter = Arc::new(NotificationEmitter::new(
            sink,
            config.notifications.max_delivery_attempts,
        ));
        let store = Arc::new(BookingStore::new(
            properties,
            emitter.clone(),
            config.bookings.pricing,
        ));
        let payments = PaymentCoordinator::new(
            store.clone(),
            gateway,
            emitter.clone(),
            PaymentSettings {
                policy: config.bookings.payment_policy,
                gateway_timeout: Duration::from_millis(config.payments.gateway_timeout_ms),
                reuse_pending_attempt: config.payments.reuse_pending_attempt,
            },
        );

        Self {
            store,
            payments,
            emitter,
            dispatch_interval: Duration::from_millis(config.notifications.dispatch_interval_ms),
        }
    }

    /// Start delivering queued notifications in the background
    pub fn start_dispatcher(&self) -> JoinHandle<()> {
        self.emitter.spawn_dispatcher(self.dispatch_interval)
    }

    /// Deliver queued notifications now
    pub async fn flush_notifications(&self) {
        self.emitter.dispatch_pending().await;
    }

    pub async fn create_booking(
        &self,
        session: &Session,
        property_id: &str,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Booking> {
        self.store
            .create(session, property_id, check_in, check_out)
            .await
    }

    pub async fn approve(&self, session: &Session, booking_id: &str) -> Result<Booking> {
        self.store.approve(session, booking_id).await
    }

    pub async fn reject(&self, session: &Session, booking_id: &str) -> Result<Booking> {
        let booking = self.store.reject(session, booking_id).await?;
        self.close_attempts(&booking).await;
        Ok(booking)
    }

    pub async fn cancel(&self, session: &Session, booking_id: &str) -> Result<Booking> {
        let booking = self.store.cancel(session, booking_id).await?;
        self.close_attempts(&booking).await;
        Ok(booking)
    }

    // the transition already happened; a failure here only leaves a stale checkout listed
    async fn close_attempts(&self, booking: &Booking) {
        if let Err(err) = self.payments.close_attempts(&booking.id).await {
            warn!(booking_id = %booking.id, error = %err, "Failed to void open checkouts");
        }
    }

    pub async fn booking(&self, session: &Session, booking_id: &str) -> Result<Booking> {
        self.store.get(session, booking_id).await
    }

    pub async fn bookings(&self, session: &Session) -> Result<Vec<Booking>> {
        self.store.list_for(session).await
    }

    pub async fn sweep_conflicts(&self, session: &Session, property_id: &str) -> Result<Vec<Booking>> {
        self.store.sweep_conflicts(session, property_id).await
    }

    pub async fn initiate_payment(&self, session: &Session, booking_id: &str) -> Result<Checkout> {
        self.payments.initiate(session, booking_id).await
    }

    /// Handle the gateway redirect/callback carrying `reference`
    pub async fn reconcile_payment(&self, reference: &str) -> Result<PaymentOutcome> {
        self.payments.reconcile(reference).await
    }

    pub async fn payment_attempts(&self, session: &Session, booking_id: &str) -> Result<Vec<PaymentAttempt>> {
        self.payments.attempts_for(session, booking_id).await
    }

    pub async fn notifications(&self, session: &Session) -> Result<Vec<Notification>> {
        self.emitter.list(session).await
    }

    pub async fn unseen_notifications(&self, session: &Session) -> Result<usize> {
        self.emitter.unseen_count(session).await
    }

    pub async fn mark_notification_seen(&self, session: &Session, notification_id: &str) -> Result<()> {
        self.emitter.mark_seen(session, notification_id).await
    }
}
