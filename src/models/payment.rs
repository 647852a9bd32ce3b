use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a checkout session as reported by the gateway
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    /// No longer payable on our side, but the checkout may still settle at
    /// the gateway, so reconciliation keeps asking
    Voided,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

/// One external checkout session tied to exactly one booking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// Transaction reference issued by the gateway
    pub reference: String,
    pub booking_id: String,
    pub amount: u64,
    pub checkout_url: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voided_attempts_stay_open_for_reconciliation() {
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(!PaymentStatus::Voided.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
    }
}
