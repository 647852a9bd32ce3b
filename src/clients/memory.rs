//! In-process collaborators used by the demo runner and the tests.

use crate::clients::traits::{Checkout, NotificationSink, PaymentGateway, PropertyDirectory};
use crate::error::{BookingError, Result};
use crate::models::{Notification, NotificationKind, PaymentStatus, PropertyInfo};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryPropertyDirectory {
    properties: DashMap<String, PropertyInfo>,
}

impl InMemoryPropertyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, property: PropertyInfo) {
        self.properties.insert(property.id.clone(), property);
    }
}

#[async_trait]
impl PropertyDirectory for InMemoryPropertyDirectory {
    async fn lookup(&self, property_id: &str) -> Result<PropertyInfo> {
        self.properties
            .get(property_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| BookingError::NotFound(format!("property {property_id}")))
    }
}

#[derive(Default)]
struct NotificationTable {
    by_id: HashMap<String, Notification>,
    by_recipient: HashMap<String, Vec<String>>,
}

/// Notification table keyed by id with a recipient index
#[derive(Default)]
pub struct InMemoryNotificationSink {
    table: RwLock<NotificationTable>,
    failures_left: AtomicUsize,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` pushes fail
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub async fn total(&self) -> usize {
        self.table.read().await.by_id.len()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn push(
        &self,
        recipient_id: &str,
        message: &str,
        kind: NotificationKind,
    ) -> Result<Notification> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BookingError::Api("notification sink unavailable".to_string()));
        }

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            recipient_id: recipient_id.to_string(),
            message: message.to_string(),
            kind,
            seen: false,
            created_at: Utc::now(),
        };

        let mut table = self.table.write().await;
        table
            .by_recipient
            .entry(recipient_id.to_string())
            .or_default()
            .push(notification.id.clone());
        table
            .by_id
            .insert(notification.id.clone(), notification.clone());

        Ok(notification)
    }

    async fn list(&self, recipient_id: &str) -> Result<Vec<Notification>> {
        let table = self.table.read().await;
        let ids = table.by_recipient.get(recipient_id);
        Ok(ids
            .into_iter()
            .flatten()
            .filter_map(|id| table.by_id.get(id).cloned())
            .collect())
    }

    async fn mark_seen(&self, notification_id: &str) -> Result<()> {
        let mut table = self.table.write().await;
        match table.by_id.get_mut(notification_id) {
            Some(notification) => {
                notification.seen = true;
                Ok(())
            }
            None => Err(BookingError::NotFound(format!(
                "notification {notification_id}"
            ))),
        }
    }
}

/// Gateway double whose verification answers are set by the caller
#[derive(Default)]
pub struct ScriptedGateway {
    statuses: DashMap<String, PaymentStatus>,
    unreachable: DashMap<String, ()>,
    checkouts: AtomicUsize,
    delay: RwLock<Option<Duration>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status the gateway will report for `reference` from now on
    pub fn set_status(&self, reference: &str, status: PaymentStatus) {
        self.statuses.insert(reference.to_string(), status);
    }

    /// Simulate a network failure when verifying `reference`
    pub fn make_unreachable(&self, reference: &str) {
        self.unreachable.insert(reference.to_string(), ());
    }

    /// Delay every call, to exercise caller timeouts
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    pub fn checkouts_created(&self) -> usize {
        self.checkouts.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_checkout(&self, _amount: u64, booking_id: &str) -> Result<Checkout> {
        self.wait().await;

        let n = self.checkouts.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = format!("ref-{booking_id}-{n}");
        self.statuses
            .insert(reference.clone(), PaymentStatus::Pending);

        Ok(Checkout {
            checkout_url: format!("https://checkout.test/pay/{reference}"),
            reference,
        })
    }

    async fn get_status(&self, reference: &str) -> Result<PaymentStatus> {
        self.wait().await;

        if self.unreachable.contains_key(reference) {
            return Err(BookingError::VerificationFailed("connection reset".to_string()));
        }
        self.statuses
            .get(reference)
            .map(|s| *s.value())
            .ok_or_else(|| BookingError::VerificationFailed(format!("unknown reference {reference}")))
    }

    fn gateway_name(&self) -> &'static str {
        "Scripted"
    }
}
