//! Booking lifecycle state machine.
//!
//! `pending` is the only non-terminal status. Every event is checked here
//! before the store commits anything, so the legal transitions live in one
//! table instead of being spread over the store and the payment flow.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BookingError, Result};
use crate::models::BookingStatus;

/// Something that asks a booking to change status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingEvent {
    /// Owner accepts the request
    Approve,
    /// Owner declines the request
    Reject,
    /// Student withdraws the request
    Cancel,
    /// Gateway reported a completed payment
    PaymentCompleted,
    /// Another booking for an overlapping range was confirmed first
    ConflictDetected,
    /// Student asks for a checkout. Never changes status on its own; the
    /// payment coordinator uses it to report a booking that is not payable.
    InitiatePayment,
}

impl BookingEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingEvent::Approve => "approve",
            BookingEvent::Reject => "reject",
            BookingEvent::Cancel => "cancel",
            BookingEvent::PaymentCompleted => "complete payment for",
            BookingEvent::ConflictDetected => "mark as conflicting",
            BookingEvent::InitiatePayment => "pay for",
        }
    }
}

impl fmt::Display for BookingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether payment happens after owner approval or before it
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPolicy {
    /// Owner approves, then the student pays a confirmed booking
    #[default]
    ApprovalFirst,
    /// Student pays a pending booking; completed payment confirms it
    PaymentFirst,
}

impl PaymentPolicy {
    /// Status a booking must be in before a checkout can be opened
    pub fn payable_status(self) -> BookingStatus {
        match self {
            PaymentPolicy::ApprovalFirst => BookingStatus::Confirmed,
            PaymentPolicy::PaymentFirst => BookingStatus::Pending,
        }
    }
}

/// Resolve the status an event leads to, or refuse it.
///
/// `PaymentCompleted` on a `confirmed` booking is accepted and keeps the
/// status; it only attaches payment metadata.
pub fn next_status(current: BookingStatus, event: BookingEvent) -> Result<BookingStatus> {
    use BookingEvent::*;
    use BookingStatus::*;

    match (current, event) {
        (Pending, Approve) | (Pending, PaymentCompleted) => Ok(Confirmed),
        (Pending, Reject) | (Pending, Cancel) => Ok(Cancelled),
        (Pending, ConflictDetected) => Ok(AlreadyBooked),
        (Confirmed, PaymentCompleted) => Ok(Confirmed),
        (from, event) => Err(BookingError::InvalidTransition { from, event }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::AlreadyBooked,
        BookingStatus::Cancelled,
    ];

    const ALL_EVENTS: [BookingEvent; 6] = [
        BookingEvent::Approve,
        BookingEvent::Reject,
        BookingEvent::Cancel,
        BookingEvent::PaymentCompleted,
        BookingEvent::ConflictDetected,
        BookingEvent::InitiatePayment,
    ];

    #[test]
    fn pending_moves_forward() {
        assert_eq!(
            next_status(BookingStatus::Pending, BookingEvent::Approve).unwrap(),
            BookingStatus::Confirmed
        );
        assert_eq!(
            next_status(BookingStatus::Pending, BookingEvent::Reject).unwrap(),
            BookingStatus::Cancelled
        );
        assert_eq!(
            next_status(BookingStatus::Pending, BookingEvent::Cancel).unwrap(),
            BookingStatus::Cancelled
        );
        assert_eq!(
            next_status(BookingStatus::Pending, BookingEvent::ConflictDetected).unwrap(),
            BookingStatus::AlreadyBooked
        );
    }

    #[test]
    fn terminal_statuses_never_change() {
        for from in ALL_STATUSES.into_iter().filter(|s| s.is_terminal()) {
            for event in ALL_EVENTS {
                match next_status(from, event) {
                    Ok(to) => {
                        assert_eq!(from, BookingStatus::Confirmed);
                        assert_eq!(event, BookingEvent::PaymentCompleted);
                        assert_eq!(to, BookingStatus::Confirmed);
                    }
                    Err(BookingError::InvalidTransition { from: f, event: e }) => {
                        assert_eq!(f, from);
                        assert_eq!(e, event);
                    }
                    Err(other) => panic!("unexpected error {other}"),
                }
            }
        }
    }

    #[test]
    fn payable_status_follows_policy() {
        assert_eq!(
            PaymentPolicy::ApprovalFirst.payable_status(),
            BookingStatus::Confirmed
        );
        assert_eq!(
            PaymentPolicy::PaymentFirst.payable_status(),
            BookingStatus::Pending
        );
    }
}
