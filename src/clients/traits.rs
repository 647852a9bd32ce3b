use crate::error::Result;
use crate::models::{Notification, NotificationKind, PaymentStatus, PropertyInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Source of listing data (owner and rate) for booking creation
#[async_trait]
pub trait PropertyDirectory: Send + Sync {
    async fn lookup(&self, property_id: &str) -> Result<PropertyInfo>;
}

/// Checkout session opened at the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub checkout_url: String,
    pub reference: String,
}

/// External checkout provider. Treated as untrusted and fallible.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a checkout session for `amount` and return where to send the payer
    async fn create_checkout(&self, amount: u64, booking_id: &str) -> Result<Checkout>;

    /// Ask the gateway for the current status of a checkout session
    async fn get_status(&self, reference: &str) -> Result<PaymentStatus>;

    fn gateway_name(&self) -> &'static str;
}

/// Where notifications end up and where users read them from
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn push(
        &self,
        recipient_id: &str,
        message: &str,
        kind: NotificationKind,
    ) -> Result<Notification>;

    async fn list(&self, recipient_id: &str) -> Result<Vec<Notification>>;

    /// Marking an already seen notification succeeds
    async fn mark_seen(&self, notification_id: &str) -> Result<()>;
}
