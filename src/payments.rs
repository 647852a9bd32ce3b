//! Payment coordinator.
//!
//! Opens checkout sessions at the gateway and folds the gateway's final
//! answer back into the booking lifecycle. `initiate` and `reconcile` for one
//! booking are serialized by a per-booking lock, so there is never more than
//! one `pending` attempt for a booking, and a duplicated callback sees the
//! attempt already resolved and returns the recorded outcome untouched.
//!
//! An attempt we stop offering (replaced by a newer checkout, or its booking
//! closed) becomes `voided` rather than `failed`: the old checkout page may
//! still take money, so `reconcile` keeps verifying it with the gateway.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::clients::{Checkout, PaymentGateway};
use crate::error::{BookingError, Result};
use crate::lifecycle::{BookingEvent, PaymentPolicy};
use crate::models::{
    Booking, BookingStatus, NotificationKind, PaymentAttempt, PaymentStatus, Session,
};
use crate::notifications::NotificationEmitter;
use crate::store::BookingStore;

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub policy: PaymentPolicy,
    pub gateway_timeout: Duration,
    pub reuse_pending_attempt: bool,
}

/// What a reconciliation established
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub reference: String,
    pub booking_id: String,
    pub payment_status: PaymentStatus,
    pub booking_status: BookingStatus,
}

#[derive(Default)]
struct AttemptTable {
    by_reference: HashMap<String, PaymentAttempt>,
    by_booking: HashMap<String, Vec<String>>,
}

impl AttemptTable {
    fn pending_for(&self, booking_id: &str) -> Option<&PaymentAttempt> {
        self.by_booking
            .get(booking_id)
            .into_iter()
            .flatten()
            .filter_map(|r| self.by_reference.get(r))
            .find(|a| a.status == PaymentStatus::Pending)
    }

    fn insert(&mut self, attempt: PaymentAttempt) {
        self.by_booking
            .entry(attempt.booking_id.clone())
            .or_default()
            .push(attempt.reference.clone());
        self.by_reference.insert(attempt.reference.clone(), attempt);
    }

    fn resolve(&mut self, reference: &str, status: PaymentStatus, reason: Option<String>) {
        if let Some(attempt) = self.by_reference.get_mut(reference) {
            attempt.status = status;
            attempt.failure_reason = reason;
            attempt.resolved_at = Some(Utc::now());
        }
    }

    /// Void every `pending` attempt of a booking, returning their references
    fn void_pending(&mut self, booking_id: &str, reason: &str) -> Vec<String> {
        let references: Vec<String> = self
            .by_booking
            .get(booking_id)
            .into_iter()
            .flatten()
            .filter(|r| {
                self.by_reference
                    .get(*r)
                    .is_some_and(|a| a.status == PaymentStatus::Pending)
            })
            .cloned()
            .collect();
        for reference in &references {
            self.resolve(reference, PaymentStatus::Voided, Some(reason.to_string()));
        }
        references
    }
}

pub struct PaymentCoordinator {
    store: Arc<BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    emitter: Arc<NotificationEmitter>,
    attempts: RwLock<AttemptTable>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    settings: PaymentSettings,
}

impl PaymentCoordinator {
    pub fn new(
        store: Arc<BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        emitter: Arc<NotificationEmitter>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            emitter,
            attempts: RwLock::new(AttemptTable::default()),
            locks: DashMap::new(),
            settings,
        }
    }

    fn lock_for(&self, booking_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(booking_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the booking's lock entry once nobody else holds or waits on it
    fn release(&self, booking_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(booking_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Option<Result<T>> {
        tokio::time::timeout(self.settings.gateway_timeout, call).await.ok()
    }

    /// Open (or hand back) the checkout for a booking the student may pay
    pub async fn initiate(&self, session: &Session, booking_id: &str) -> Result<Checkout> {
        let booking = self.store.get(session, booking_id).await?;
        if booking.student_id != session.user_id {
            return Err(BookingError::Forbidden(format!("payment for booking {booking_id}")));
        }

        let lock = self.lock_for(booking_id);
        let result = {
            let _guard = lock.lock().await;
            self.initiate_locked(session, booking_id).await
        };
        self.release(booking_id, lock);
        result
    }

    async fn initiate_locked(&self, session: &Session, booking_id: &str) -> Result<Checkout> {
        // re-read under the lock; the booking may have moved while we waited
        let booking = self.store.get(session, booking_id).await?;
        self.ensure_payable(&booking)?;

        let outstanding = self.attempts.read().await.pending_for(booking_id).cloned();
        if let Some(attempt) = outstanding {
            if self.settings.reuse_pending_attempt {
                debug!(booking_id = %booking_id, reference = %attempt.reference, "Reusing pending checkout");
                return Ok(Checkout {
                    checkout_url: attempt.checkout_url,
                    reference: attempt.reference,
                });
            }
            self.supersede(&attempt).await?;
            // settling the old checkout may have paid the booking
            self.ensure_payable(&self.store.find(booking_id).await?)?;
        }

        let checkout = match self
            .bounded(self.gateway.create_checkout(booking.total_amount, booking_id))
            .await
        {
            Some(Ok(checkout)) => checkout,
            Some(Err(err)) => {
                warn!(booking_id = %booking_id, error = %err, "Checkout creation failed");
                return Err(match err {
                    BookingError::GatewayUnavailable(_) | BookingError::Validation(_) => err,
                    other => BookingError::GatewayUnavailable(other.to_string()),
                });
            }
            None => {
                warn!(booking_id = %booking_id, gateway = self.gateway.gateway_name(), "Checkout creation timed out");
                return Err(BookingError::GatewayUnavailable(format!(
                    "{} did not answer in time",
                    self.gateway.gateway_name()
                )));
            }
        };

        self.attempts.write().await.insert(PaymentAttempt {
            reference: checkout.reference.clone(),
            booking_id: booking_id.to_string(),
            amount: booking.total_amount,
            checkout_url: checkout.checkout_url.clone(),
            status: PaymentStatus::Pending,
            failure_reason: None,
            created_at: Utc::now(),
            resolved_at: None,
        });

        info!(
            booking_id = %booking_id,
            reference = %checkout.reference,
            amount = booking.total_amount,
            "Payment initiated"
        );
        Ok(checkout)
    }

    fn ensure_payable(&self, booking: &Booking) -> Result<()> {
        if booking.status != self.settings.policy.payable_status() || booking.paid_reference.is_some() {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                event: BookingEvent::InitiatePayment,
            });
        }
        Ok(())
    }

    /// Retire the outstanding attempt before a new checkout replaces it.
    ///
    /// The gateway is asked first: a payment that already went through is
    /// applied instead of being thrown away.
    async fn supersede(&self, attempt: &PaymentAttempt) -> Result<()> {
        let reference = attempt.reference.as_str();
        match self.bounded(self.gateway.get_status(reference)).await {
            Some(Ok(PaymentStatus::Completed)) => {
                info!(booking_id = %attempt.booking_id, reference = %reference, "Outstanding checkout was already paid");
                self.apply(reference, &attempt.booking_id, PaymentStatus::Completed)
                    .await
            }
            Some(Ok(PaymentStatus::Failed)) => {
                self.attempts.write().await.resolve(
                    reference,
                    PaymentStatus::Failed,
                    Some("declined".to_string()),
                );
                Ok(())
            }
            _ => {
                info!(booking_id = %attempt.booking_id, reference = %reference, "Superseding pending checkout");
                self.attempts.write().await.resolve(
                    reference,
                    PaymentStatus::Voided,
                    Some("superseded".to_string()),
                );
                Ok(())
            }
        }
    }

    /// Resolve the gateway's answer for `reference` into the booking
    pub async fn reconcile(&self, reference: &str) -> Result<PaymentOutcome> {
        let booking_id = self
            .attempts
            .read()
            .await
            .by_reference
            .get(reference)
            .map(|a| a.booking_id.clone())
            .ok_or_else(|| {
                BookingError::VerificationFailed(format!("unknown reference {reference}"))
            })?;

        let lock = self.lock_for(&booking_id);
        let result = {
            let _guard = lock.lock().await;
            self.reconcile_locked(reference, &booking_id).await
        };
        self.release(&booking_id, lock);
        result
    }

    async fn reconcile_locked(&self, reference: &str, booking_id: &str) -> Result<PaymentOutcome> {
        let recorded = self
            .attempts
            .read()
            .await
            .by_reference
            .get(reference)
            .map(|a| a.status);
        if recorded.is_some_and(PaymentStatus::is_terminal) {
            debug!(reference = %reference, "Payment already reconciled");
            return self.outcome(reference, booking_id).await;
        }

        let status = match self.bounded(self.gateway.get_status(reference)).await {
            Some(Ok(status)) => status,
            Some(Err(err)) => {
                warn!(reference = %reference, error = %err, "Payment verification failed");
                return Err(match err {
                    BookingError::VerificationFailed(_) => err,
                    other => BookingError::VerificationFailed(other.to_string()),
                });
            }
            None => {
                warn!(reference = %reference, "Payment verification timed out");
                return Err(BookingError::VerificationFailed(format!(
                    "{} did not answer in time",
                    self.gateway.gateway_name()
                )));
            }
        };

        self.apply(reference, booking_id, status).await?;
        self.outcome(reference, booking_id).await
    }

    /// Record a status the gateway reported for a non-terminal attempt
    async fn apply(&self, reference: &str, booking_id: &str, status: PaymentStatus) -> Result<()> {
        let previous = self
            .attempts
            .read()
            .await
            .by_reference
            .get(reference)
            .map(|a| (a.status, a.failure_reason.clone()));
        let voided_reason = match previous {
            Some((PaymentStatus::Voided, reason)) => reason,
            _ => None,
        };

        match status {
            PaymentStatus::Pending | PaymentStatus::Voided => {
                debug!(reference = %reference, "Payment still pending at gateway");
            }
            PaymentStatus::Failed => {
                let live = voided_reason.is_none();
                self.attempts.write().await.resolve(
                    reference,
                    PaymentStatus::Failed,
                    voided_reason.or_else(|| Some("declined".to_string())),
                );
                info!(booking_id = %booking_id, reference = %reference, "Payment failed");
                // a voided checkout failing is no news to the student
                if live {
                    if let Ok(booking) = self.store.find(booking_id).await {
                        self.emitter.emit(
                            &booking.student_id,
                            "Payment failed, please retry",
                            NotificationKind::System,
                        );
                    }
                }
            }
            PaymentStatus::Completed => {
                if let Some(reason) = &voided_reason {
                    warn!(
                        booking_id = %booking_id,
                        reference = %reference,
                        voided_because = %reason,
                        "Payment completed on a voided checkout"
                    );
                }
                let applied = match self.store.confirm_paid(booking_id, reference, Utc::now()).await {
                    Ok(_) => true,
                    Err(BookingError::InvalidTransition { from, .. }) => {
                        // money moved for a booking that can no longer take it
                        warn!(
                            booking_id = %booking_id,
                            reference = %reference,
                            booking_status = %from,
                            "Payment completed for a booking that is no longer payable"
                        );
                        false
                    }
                    Err(err) => return Err(err),
                };

                let mut attempts = self.attempts.write().await;
                attempts.resolve(reference, PaymentStatus::Completed, None);
                if applied {
                    for other in attempts.void_pending(booking_id, "paid by another checkout") {
                        debug!(booking_id = %booking_id, reference = %other, "Voided checkout of a paid booking");
                    }
                }
                drop(attempts);
                info!(booking_id = %booking_id, reference = %reference, "Payment completed");
            }
        }
        Ok(())
    }

    /// Void the open attempts of a booking that was cancelled or lost its
    /// dates, so they no longer show as payable
    pub async fn close_attempts(&self, booking_id: &str) -> Result<()> {
        let booking = self.store.find(booking_id).await?;
        self.void_if_closed(&booking).await;
        Ok(())
    }

    async fn void_if_closed(&self, booking: &Booking) {
        if !matches!(
            booking.status,
            BookingStatus::Cancelled | BookingStatus::AlreadyBooked
        ) {
            return;
        }
        let voided = self
            .attempts
            .write()
            .await
            .void_pending(&booking.id, "booking closed");
        for reference in voided {
            info!(booking_id = %booking.id, reference = %reference, "Voided checkout of a closed booking");
        }
    }

    /// Every attempt made for a booking the caller can see, oldest first
    pub async fn attempts_for(&self, session: &Session, booking_id: &str) -> Result<Vec<PaymentAttempt>> {
        let booking = self.store.get(session, booking_id).await?;
        self.void_if_closed(&booking).await;

        let table = self.attempts.read().await;
        let mut attempts: Vec<PaymentAttempt> = table
            .by_booking
            .get(booking_id)
            .into_iter()
            .flatten()
            .filter_map(|r| table.by_reference.get(r).cloned())
            .collect();
        attempts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(attempts)
    }

    async fn outcome(&self, reference: &str, booking_id: &str) -> Result<PaymentOutcome> {
        let payment_status = self
            .attempts
            .read()
            .await
            .by_reference
            .get(reference)
            .map(|a| a.status)
            .ok_or_else(|| BookingError::NotFound(format!("payment {reference}")))?;
        Ok(PaymentOutcome {
            reference: reference.to_string(),
            booking_id: booking_id.to_string(),
            payment_status,
            booking_status: self.store.find(booking_id).await?.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{InMemoryNotificationSink, InMemoryPropertyDirectory, ScriptedGateway};
    use crate::models::PropertyInfo;
    use crate::pricing::PricingPolicy;

    struct Fixture {
        store: Arc<BookingStore>,
        payments: PaymentCoordinator,
        gateway: Arc<ScriptedGateway>,
    }

    fn fixture(policy: PaymentPolicy, reuse: bool) -> Fixture {
        let directory = InMemoryPropertyDirectory::new();
        directory.insert(PropertyInfo {
            id: "P1".into(),
            owner_id: "o1".into(),
            rate: 300,
        });
        let sink = Arc::new(InMemoryNotificationSink::new());
        let emitter = Arc::new(NotificationEmitter::new(sink, 3));
        let store = Arc::new(BookingStore::new(
            Arc::new(directory),
            emitter.clone(),
            PricingPolicy::Monthly,
        ));
        let gateway = Arc::new(ScriptedGateway::new());
        let payments = PaymentCoordinator::new(
            store.clone(),
            gateway.clone(),
            emitter,
            PaymentSettings {
                policy,
                gateway_timeout: Duration::from_millis(200),
                reuse_pending_attempt: reuse,
            },
        );
        Fixture {
            store,
            payments,
            gateway,
        }
    }

    async fn booking(f: &Fixture) -> String {
        f.store
            .create(
                &Session::student("s1"),
                "P1",
                "2024-09-01".parse().unwrap(),
                "2024-12-01".parse().unwrap(),
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn pending_booking_is_not_payable_before_approval() {
        let f = fixture(PaymentPolicy::ApprovalFirst, true);
        let id = booking(&f).await;

        let err = f.payments.initiate(&Session::student("s1"), &id).await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::InvalidTransition {
                from: BookingStatus::Pending,
                event: BookingEvent::InitiatePayment
            }
        ));
        assert_eq!(f.gateway.checkouts_created(), 0);
    }

    #[tokio::test]
    async fn second_initiate_reuses_the_outstanding_attempt() {
        let f = fixture(PaymentPolicy::PaymentFirst, true);
        let id = booking(&f).await;
        let student = Session::student("s1");

        let first = f.payments.initiate(&student, &id).await.unwrap();
        let second = f.payments.initiate(&student, &id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.gateway.checkouts_created(), 1);
        assert_eq!(f.payments.attempts_for(&student, &id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn superseding_leaves_one_pending_attempt() {
        let f = fixture(PaymentPolicy::PaymentFirst, false);
        let id = booking(&f).await;
        let student = Session::student("s1");

        let first = f.payments.initiate(&student, &id).await.unwrap();
        let second = f.payments.initiate(&student, &id).await.unwrap();
        assert_ne!(first.reference, second.reference);

        let attempts = f.payments.attempts_for(&student, &id).await.unwrap();
        let pending: Vec<_> = attempts
            .iter()
            .filter(|a| a.status == PaymentStatus::Pending)
            .collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reference, second.reference);
        assert_eq!(attempts[0].failure_reason.as_deref(), Some("superseded"));
    }

    #[tokio::test]
    async fn only_the_student_may_pay() {
        let f = fixture(PaymentPolicy::PaymentFirst, true);
        let id = booking(&f).await;

        let err = f.payments.initiate(&Session::owner("o1"), &id).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
    }

    #[tokio::test]
    async fn payment_first_completion_confirms() {
        let f = fixture(PaymentPolicy::PaymentFirst, true);
        let id = booking(&f).await;
        let checkout = f.payments.initiate(&Session::student("s1"), &id).await.unwrap();

        f.gateway.set_status(&checkout.reference, PaymentStatus::Completed);
        let outcome = f.payments.reconcile(&checkout.reference).await.unwrap();

        assert_eq!(outcome.payment_status, PaymentStatus::Completed);
        assert_eq!(outcome.booking_status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn gateway_still_pending_changes_nothing() {
        let f = fixture(PaymentPolicy::PaymentFirst, true);
        let id = booking(&f).await;
        let checkout = f.payments.initiate(&Session::student("s1"), &id).await.unwrap();

        let outcome = f.payments.reconcile(&checkout.reference).await.unwrap();
        assert_eq!(outcome.payment_status, PaymentStatus::Pending);
        assert_eq!(outcome.booking_status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn slow_gateway_surfaces_unavailable() {
        let f = fixture(PaymentPolicy::PaymentFirst, true);
        let id = booking(&f).await;
        f.gateway.set_delay(Some(Duration::from_secs(5))).await;

        let err = f.payments.initiate(&Session::student("s1"), &id).await.unwrap_err();
        assert!(matches!(err, BookingError::GatewayUnavailable(_)));
        assert!(f
            .payments
            .attempts_for(&Session::student("s1"), &id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn cancelled_booking_keeps_its_status_when_paid_late() {
        let f = fixture(PaymentPolicy::PaymentFirst, true);
        let id = booking(&f).await;
        let student = Session::student("s1");
        let checkout = f.payments.initiate(&student, &id).await.unwrap();

        f.store.cancel(&student, &id).await.unwrap();
        f.gateway.set_status(&checkout.reference, PaymentStatus::Completed);
        let outcome = f.payments.reconcile(&checkout.reference).await.unwrap();

        assert_eq!(outcome.payment_status, PaymentStatus::Completed);
        assert_eq!(outcome.booking_status, BookingStatus::Cancelled);
    }

    async fn approved_booking(f: &Fixture) -> String {
        let id = booking(f).await;
        f.store.approve(&Session::owner("o1"), &id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn late_payment_on_a_superseded_checkout_is_recorded() {
        let f = fixture(PaymentPolicy::ApprovalFirst, false);
        let id = approved_booking(&f).await;
        let student = Session::student("s1");

        let first = f.payments.initiate(&student, &id).await.unwrap();
        let second = f.payments.initiate(&student, &id).await.unwrap();

        f.gateway.set_status(&first.reference, PaymentStatus::Completed);
        let outcome = f.payments.reconcile(&first.reference).await.unwrap();

        assert_eq!(outcome.payment_status, PaymentStatus::Completed);
        assert_eq!(outcome.booking_status, BookingStatus::Confirmed);
        let booking = f.store.find(&id).await.unwrap();
        assert_eq!(booking.paid_reference.as_deref(), Some(first.reference.as_str()));

        // the newer checkout is no longer offered and nothing is payable
        let attempts = f.payments.attempts_for(&student, &id).await.unwrap();
        let newer = attempts.iter().find(|a| a.reference == second.reference).unwrap();
        assert_eq!(newer.status, PaymentStatus::Voided);
        assert!(matches!(
            f.payments.initiate(&student, &id).await,
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn superseding_applies_a_payment_already_made() {
        let f = fixture(PaymentPolicy::ApprovalFirst, false);
        let id = approved_booking(&f).await;
        let student = Session::student("s1");

        let first = f.payments.initiate(&student, &id).await.unwrap();
        f.gateway.set_status(&first.reference, PaymentStatus::Completed);

        let err = f.payments.initiate(&student, &id).await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::InvalidTransition {
                from: BookingStatus::Confirmed,
                event: BookingEvent::InitiatePayment
            }
        ));
        assert_eq!(f.gateway.checkouts_created(), 1);
        let booking = f.store.find(&id).await.unwrap();
        assert_eq!(booking.paid_reference.as_deref(), Some(first.reference.as_str()));

        // the callback for that checkout arrives afterwards and changes nothing
        let outcome = f.payments.reconcile(&first.reference).await.unwrap();
        assert_eq!(outcome.payment_status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn second_payment_does_not_replace_the_first() {
        let f = fixture(PaymentPolicy::ApprovalFirst, false);
        let id = approved_booking(&f).await;
        let student = Session::student("s1");

        let first = f.payments.initiate(&student, &id).await.unwrap();
        let second = f.payments.initiate(&student, &id).await.unwrap();
        f.gateway.set_status(&second.reference, PaymentStatus::Completed);
        f.payments.reconcile(&second.reference).await.unwrap();

        f.gateway.set_status(&first.reference, PaymentStatus::Completed);
        let outcome = f.payments.reconcile(&first.reference).await.unwrap();

        assert_eq!(outcome.payment_status, PaymentStatus::Completed);
        let booking = f.store.find(&id).await.unwrap();
        assert_eq!(booking.paid_reference.as_deref(), Some(second.reference.as_str()));
    }

    #[tokio::test]
    async fn closing_a_booking_voids_its_open_checkout() {
        let f = fixture(PaymentPolicy::PaymentFirst, true);
        let id = booking(&f).await;
        let student = Session::student("s1");
        let checkout = f.payments.initiate(&student, &id).await.unwrap();

        f.store.cancel(&student, &id).await.unwrap();
        f.payments.close_attempts(&id).await.unwrap();

        let attempts = f.payments.attempts_for(&student, &id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].reference, checkout.reference);
        assert_eq!(attempts[0].status, PaymentStatus::Voided);
        assert_eq!(attempts[0].failure_reason.as_deref(), Some("booking closed"));
    }

    #[tokio::test]
    async fn attempt_listing_voids_checkouts_of_rejected_bookings() {
        let f = fixture(PaymentPolicy::PaymentFirst, true);
        let id = booking(&f).await;
        let student = Session::student("s1");
        f.payments.initiate(&student, &id).await.unwrap();

        f.store.reject(&Session::owner("o1"), &id).await.unwrap();

        let attempts = f.payments.attempts_for(&student, &id).await.unwrap();
        assert!(attempts.iter().all(|a| a.status != PaymentStatus::Pending));
    }

    #[tokio::test]
    async fn booking_locks_are_dropped_after_use() {
        let f = fixture(PaymentPolicy::PaymentFirst, true);
        let id = booking(&f).await;
        let checkout = f.payments.initiate(&Session::student("s1"), &id).await.unwrap();
        assert!(f.payments.locks.is_empty());

        f.gateway.set_status(&checkout.reference, PaymentStatus::Completed);
        f.payments.reconcile(&checkout.reference).await.unwrap();
        assert!(f.payments.locks.is_empty());
    }
}
