//! Booking store: the authoritative booking table.
//!
//! All writes go through one `RwLock`, so competing transitions on the same
//! booking (an owner approving while the student cancels) are ordered and
//! the loser sees `InvalidTransition`. The overlap check at creation runs
//! under the same lock as the insert.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::PropertyDirectory;
use crate::error::{BookingError, Result};
use crate::lifecycle::{next_status, BookingEvent};
use crate::models::{Booking, BookingStatus, DateRange, NotificationKind, Role, Session};
use crate::notifications::NotificationEmitter;
use crate::pricing::{total_amount, PricingPolicy};

#[derive(Default)]
struct Tables {
    bookings: HashMap<String, Booking>,
    by_property: HashMap<String, Vec<String>>,
    by_student: HashMap<String, Vec<String>>,
    by_owner: HashMap<String, Vec<String>>,
}

impl Tables {
    fn insert(&mut self, booking: Booking) {
        let id = booking.id.clone();
        self.by_property
            .entry(booking.property_id.clone())
            .or_default()
            .push(id.clone());
        self.by_student
            .entry(booking.student_id.clone())
            .or_default()
            .push(id.clone());
        self.by_owner
            .entry(booking.owner_id.clone())
            .or_default()
            .push(id.clone());
        self.bookings.insert(id, booking);
    }

    fn on_property<'a>(&'a self, property_id: &str) -> impl Iterator<Item = &'a Booking> + 'a {
        self.by_property
            .get(property_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.bookings.get(id))
    }

    fn collect(&self, ids: Option<&Vec<String>>) -> Vec<Booking> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.bookings.get(id).cloned())
            .collect()
    }

    fn conflicts_with_confirmed(&self, property_id: &str, dates: &DateRange) -> bool {
        self.on_property(property_id)
            .any(|b| b.status == BookingStatus::Confirmed && b.dates.overlaps(dates))
    }

    /// Move pending bookings that overlap a confirmed one to `already_booked`
    fn sweep(&mut self, property_id: &str) -> Vec<Booking> {
        let confirmed: Vec<DateRange> = self
            .on_property(property_id)
            .filter(|b| b.status == BookingStatus::Confirmed)
            .map(|b| b.dates)
            .collect();

        let losers: Vec<String> = self
            .on_property(property_id)
            .filter(|b| b.status == BookingStatus::Pending)
            .filter(|b| confirmed.iter().any(|c| c.overlaps(&b.dates)))
            .map(|b| b.id.clone())
            .collect();

        let mut swept = Vec::with_capacity(losers.len());
        for id in losers {
            if let Some(booking) = self.bookings.get_mut(&id) {
                if let Ok(to) = next_status(booking.status, BookingEvent::ConflictDetected) {
                    booking.status = to;
                    swept.push(booking.clone());
                }
            }
        }
        swept
    }
}

pub struct BookingStore {
    tables: RwLock<Tables>,
    properties: Arc<dyn PropertyDirectory>,
    emitter: Arc<NotificationEmitter>,
    pricing: PricingPolicy,
}

impl BookingStore {
    pub fn new(
        properties: Arc<dyn PropertyDirectory>,
        emitter: Arc<NotificationEmitter>,
        pricing: PricingPolicy,
    ) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            properties,
            emitter,
            pricing,
        }
    }

    /// Request a stay. Only students may book; the new booking is `pending`.
    pub async fn create(
        &self,
        session: &Session,
        property_id: &str,
        check_in: chrono::NaiveDate,
        check_out: chrono::NaiveDate,
    ) -> Result<Booking> {
        if session.role != Role::Student {
            return Err(BookingError::Forbidden("only students can book".to_string()));
        }
        let dates = DateRange::new(check_in, check_out)?;

        let property = self.properties.lookup(property_id).await?;
        let amount = total_amount(self.pricing, property.rate, &dates)?;

        let booking = {
            let mut tables = self.tables.write().await;
            if tables.conflicts_with_confirmed(&property.id, &dates) {
                warn!(
                    property_id = %property.id,
                    student_id = %session.user_id,
                    "Rejected booking overlapping a confirmed stay"
                );
                return Err(BookingError::AlreadyBooked {
                    property_id: property.id,
                });
            }

            let booking = Booking {
                id: Uuid::new_v4().to_string(),
                property_id: property.id.clone(),
                student_id: session.user_id.clone(),
                owner_id: property.owner_id.clone(),
                dates,
                total_amount: amount,
                status: BookingStatus::Pending,
                created_at: Utc::now(),
                paid_reference: None,
                paid_at: None,
            };
            tables.insert(booking.clone());
            booking
        };

        info!(
            booking_id = %booking.id,
            property_id = %booking.property_id,
            total_amount = booking.total_amount,
            "Booking created"
        );
        self.emitter.emit(
            &booking.owner_id,
            format!(
                "New booking request for property {} from {} to {}",
                booking.property_id, booking.dates.check_in, booking.dates.check_out
            ),
            NotificationKind::System,
        );

        Ok(booking)
    }

    /// Owner accepts a pending request. Overlapping pending requests on the
    /// same property become `already_booked`.
    pub async fn approve(&self, session: &Session, booking_id: &str) -> Result<Booking> {
        let (booking, swept) = {
            let mut tables = self.tables.write().await;
            let booking = Self::authorized_mut(&mut tables, booking_id, |b| {
                session.role == Role::Owner && b.owner_id == session.user_id
            })?;
            booking.status = next_status(booking.status, BookingEvent::Approve)?;
            let booking = booking.clone();
            let swept = tables.sweep(&booking.property_id);
            (booking, swept)
        };

        info!(booking_id = %booking.id, "Booking approved");
        self.emitter.emit(
            &booking.student_id,
            format!("Your booking for property {} was approved", booking.property_id),
            NotificationKind::System,
        );
        self.announce_swept(&swept);

        Ok(booking)
    }

    /// Owner declines a pending request
    pub async fn reject(&self, session: &Session, booking_id: &str) -> Result<Booking> {
        let booking = {
            let mut tables = self.tables.write().await;
            let booking = Self::authorized_mut(&mut tables, booking_id, |b| {
                session.role == Role::Owner && b.owner_id == session.user_id
            })?;
            booking.status = next_status(booking.status, BookingEvent::Reject)?;
            booking.clone()
        };

        info!(booking_id = %booking.id, "Booking rejected");
        self.emitter.emit(
            &booking.student_id,
            format!("Your booking for property {} was rejected", booking.property_id),
            NotificationKind::System,
        );

        Ok(booking)
    }

    /// Student withdraws their own pending request
    pub async fn cancel(&self, session: &Session, booking_id: &str) -> Result<Booking> {
        let booking = {
            let mut tables = self.tables.write().await;
            let booking = Self::authorized_mut(&mut tables, booking_id, |b| {
                session.role == Role::Student && b.student_id == session.user_id
            })?;
            booking.status = next_status(booking.status, BookingEvent::Cancel)?;
            booking.clone()
        };

        info!(booking_id = %booking.id, "Booking cancelled");
        self.emitter.emit(
            &booking.owner_id,
            format!("Booking {} was cancelled by the student", booking.id),
            NotificationKind::System,
        );

        Ok(booking)
    }

    pub async fn get(&self, session: &Session, booking_id: &str) -> Result<Booking> {
        let tables = self.tables.read().await;
        let booking = tables
            .bookings
            .get(booking_id)
            .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;
        if !Self::visible_to(session, booking) {
            return Err(BookingError::Forbidden(format!("booking {booking_id}")));
        }
        Ok(booking.clone())
    }

    /// Bookings in the caller's scope, newest first
    pub async fn list_for(&self, session: &Session) -> Result<Vec<Booking>> {
        let tables = self.tables.read().await;
        let mut bookings = match session.role {
            Role::Student => tables.collect(tables.by_student.get(&session.user_id)),
            Role::Owner => tables.collect(tables.by_owner.get(&session.user_id)),
            Role::Admin => tables.bookings.values().cloned().collect(),
        };
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    /// Re-run conflict detection for a property. Admins only.
    pub async fn sweep_conflicts(&self, session: &Session, property_id: &str) -> Result<Vec<Booking>> {
        if session.role != Role::Admin {
            return Err(BookingError::Forbidden("conflict sweep".to_string()));
        }
        let swept = self.tables.write().await.sweep(property_id);
        self.announce_swept(&swept);
        Ok(swept)
    }

    /// Apply a completed payment. A pending booking becomes `confirmed`; a
    /// confirmed one only gets the payment recorded.
    pub(crate) async fn confirm_paid(
        &self,
        booking_id: &str,
        reference: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Booking> {
        let (booking, was_pending, swept) = {
            let mut tables = self.tables.write().await;
            let booking = tables
                .bookings
                .get_mut(booking_id)
                .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;
            if booking.paid_reference.as_deref().is_some_and(|paid| paid != reference) {
                // already paid through another checkout
                return Err(BookingError::InvalidTransition {
                    from: booking.status,
                    event: BookingEvent::PaymentCompleted,
                });
            }
            let was_pending = booking.status == BookingStatus::Pending;
            booking.status = next_status(booking.status, BookingEvent::PaymentCompleted)?;
            booking.paid_reference = Some(reference.to_string());
            booking.paid_at = Some(paid_at);
            let booking = booking.clone();

            let swept = if was_pending {
                tables.sweep(&booking.property_id)
            } else {
                Vec::new()
            };
            (booking, was_pending, swept)
        };

        info!(booking_id = %booking.id, reference = %reference, "Payment recorded on booking");
        let student_message = if was_pending {
            format!(
                "Payment received, your booking for property {} is confirmed",
                booking.property_id
            )
        } else {
            format!("Payment received for your booking of property {}", booking.property_id)
        };
        self.emitter
            .emit(&booking.student_id, student_message, NotificationKind::System);
        self.emitter.emit(
            &booking.owner_id,
            format!("Payment received for booking {}", booking.id),
            NotificationKind::System,
        );
        self.announce_swept(&swept);

        Ok(booking)
    }

    /// Lookup without an actor check, for the payment coordinator
    pub(crate) async fn find(&self, booking_id: &str) -> Result<Booking> {
        self.tables
            .read()
            .await
            .bookings
            .get(booking_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))
    }

    fn authorized_mut<'a>(
        tables: &'a mut Tables,
        booking_id: &str,
        allowed: impl FnOnce(&Booking) -> bool,
    ) -> Result<&'a mut Booking> {
        let booking = tables
            .bookings
            .get_mut(booking_id)
            .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;
        if !allowed(booking) {
            return Err(BookingError::Forbidden(format!("booking {booking_id}")));
        }
        Ok(booking)
    }

    fn visible_to(session: &Session, booking: &Booking) -> bool {
        match session.role {
            Role::Student => booking.student_id == session.user_id,
            Role::Owner => booking.owner_id == session.user_id,
            Role::Admin => true,
        }
    }

    fn announce_swept(&self, swept: &[Booking]) {
        for booking in swept {
            warn!(booking_id = %booking.id, "Booking lost to an overlapping confirmed stay");
            self.emitter.emit(
                &booking.student_id,
                format!(
                    "Property {} is already booked for these dates",
                    booking.property_id
                ),
                NotificationKind::System,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{InMemoryNotificationSink, InMemoryPropertyDirectory};
    use crate::clients::traits::NotificationSink;
    use crate::models::PropertyInfo;
    use chrono::NaiveDate;

    struct Fixture {
        store: BookingStore,
        emitter: Arc<NotificationEmitter>,
        sink: Arc<InMemoryNotificationSink>,
    }

    fn fixture() -> Fixture {
        let directory = InMemoryPropertyDirectory::new();
        directory.insert(PropertyInfo {
            id: "P123".into(),
            owner_id: "owner-1".into(),
            rate: 100,
        });
        let sink = Arc::new(InMemoryNotificationSink::new());
        let emitter = Arc::new(NotificationEmitter::new(sink.clone(), 3));
        let store = BookingStore::new(Arc::new(directory), emitter.clone(), PricingPolicy::Daily);
        Fixture {
            store,
            emitter,
            sink,
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn create_prices_the_stay() {
        let f = fixture();
        let booking = f
            .store
            .create(&Session::student("s1"), "P123", day("2024-06-01"), day("2024-06-10"))
            .await
            .unwrap();

        assert_eq!(booking.total_amount, 1000);
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.owner_id, "owner-1");
    }

    #[tokio::test]
    async fn inverted_dates_create_nothing() {
        let f = fixture();
        let student = Session::student("s1");
        let err = f
            .store
            .create(&student, "P123", day("2024-06-10"), day("2024-06-01"))
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::Validation(_)));
        assert!(f.store.list_for(&student).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn owners_cannot_book() {
        let f = fixture();
        let err = f
            .store
            .create(&Session::owner("owner-1"), "P123", day("2024-06-01"), day("2024-06-10"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
    }

    #[tokio::test]
    async fn only_the_owning_owner_may_approve() {
        let f = fixture();
        let booking = f
            .store
            .create(&Session::student("s1"), "P123", day("2024-06-01"), day("2024-06-10"))
            .await
            .unwrap();

        let stranger = Session::owner("owner-2");
        assert!(matches!(
            f.store.approve(&stranger, &booking.id).await,
            Err(BookingError::Forbidden(_))
        ));
        assert!(matches!(
            f.store.approve(&Session::owner("owner-1"), "missing").await,
            Err(BookingError::NotFound(_))
        ));
        assert_eq!(
            f.store.find(&booking.id).await.unwrap().status,
            BookingStatus::Pending
        );
    }

    #[tokio::test]
    async fn students_cannot_cancel_each_others_bookings() {
        let f = fixture();
        let booking = f
            .store
            .create(&Session::student("s1"), "P123", day("2024-06-01"), day("2024-06-10"))
            .await
            .unwrap();

        let err = f
            .store
            .cancel(&Session::student("s2"), &booking.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
    }

    #[tokio::test]
    async fn approval_sweeps_overlapping_requests() {
        let f = fixture();
        let owner = Session::owner("owner-1");
        let first = f
            .store
            .create(&Session::student("s1"), "P123", day("2024-06-01"), day("2024-06-10"))
            .await
            .unwrap();
        let second = f
            .store
            .create(&Session::student("s2"), "P123", day("2024-06-05"), day("2024-06-15"))
            .await
            .unwrap();
        let later = f
            .store
            .create(&Session::student("s3"), "P123", day("2024-06-10"), day("2024-06-12"))
            .await
            .unwrap();

        f.store.approve(&owner, &first.id).await.unwrap();

        assert_eq!(
            f.store.find(&second.id).await.unwrap().status,
            BookingStatus::AlreadyBooked
        );
        assert_eq!(
            f.store.find(&later.id).await.unwrap().status,
            BookingStatus::Pending
        );
        assert!(matches!(
            f.store.approve(&owner, &second.id).await,
            Err(BookingError::InvalidTransition { .. })
        ));

        f.emitter.dispatch_pending().await;
        let loser = f.sink.list("s2").await.unwrap();
        assert!(loser.iter().any(|n| n.message.contains("already booked")));
    }

    #[tokio::test]
    async fn listing_is_scoped_by_actor() {
        let f = fixture();
        f.store
            .create(&Session::student("s1"), "P123", day("2024-06-01"), day("2024-06-10"))
            .await
            .unwrap();
        f.store
            .create(&Session::student("s2"), "P123", day("2024-07-01"), day("2024-07-10"))
            .await
            .unwrap();

        assert_eq!(f.store.list_for(&Session::student("s1")).await.unwrap().len(), 1);
        assert_eq!(f.store.list_for(&Session::owner("owner-1")).await.unwrap().len(), 2);
        assert!(f.store.list_for(&Session::owner("owner-2")).await.unwrap().is_empty());
        assert_eq!(f.store.list_for(&Session::admin("a1")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn get_hides_foreign_bookings() {
        let f = fixture();
        let booking = f
            .store
            .create(&Session::student("s1"), "P123", day("2024-06-01"), day("2024-06-10"))
            .await
            .unwrap();

        assert!(f.store.get(&Session::student("s1"), &booking.id).await.is_ok());
        assert!(matches!(
            f.store.get(&Session::student("s2"), &booking.id).await,
            Err(BookingError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn manual_sweep_requires_admin() {
        let f = fixture();
        assert!(matches!(
            f.store.sweep_conflicts(&Session::owner("owner-1"), "P123").await,
            Err(BookingError::Forbidden(_))
        ));
        assert!(f
            .store
            .sweep_conflicts(&Session::admin("a1"), "P123")
            .await
            .unwrap()
            .is_empty());
    }
}
