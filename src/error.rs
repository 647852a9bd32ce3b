//! Error taxonomy shared by the booking store, payment coordinator and
//! notification emitter.

use thiserror::Error;

use crate::lifecycle::BookingEvent;
use crate::models::BookingStatus;

pub type Result<T> = std::result::Result<T, BookingError>;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("not allowed: {0}")]
    Forbidden(String),

    #[error("cannot {event} a booking that is {from}")]
    InvalidTransition {
        from: BookingStatus,
        event: BookingEvent,
    },

    #[error("property {property_id} is already booked for these dates")]
    AlreadyBooked { property_id: String },

    /// The gateway could not tell us the final state of a payment
    #[error("payment verification failed: {0}")]
    VerificationFailed(String),

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("invalid input: {0}")]
    Validation(String),

    /// A collaborator API call failed at the transport level
    #[error("api request failed: {0}")]
    Api(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BookingError {
    /// Text safe to show an end user.
    ///
    /// `NotFound` and `Forbidden` collapse into one message so callers cannot
    /// test for the existence of ids they are not allowed to see.
    pub fn public_message(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) | BookingError::Forbidden(_) => {
                "You do not have permission to perform this action"
            }
            BookingError::AlreadyBooked { .. } => "Property already booked for these dates",
            BookingError::VerificationFailed(_) | BookingError::GatewayUnavailable(_) => {
                "Payment failed, please retry"
            }
            BookingError::InvalidTransition { .. } => "This booking can no longer be changed",
            BookingError::Validation(_) => "The request is invalid",
            BookingError::Api(_) | BookingError::Config(_) => "Something went wrong, please try again",
        }
    }
}

impl From<reqwest::Error> for BookingError {
    fn from(err: reqwest::Error) -> Self {
        BookingError::Api(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_forbidden_look_the_same_to_users() {
        let missing = BookingError::NotFound("booking b-1".into());
        let denied = BookingError::Forbidden("booking b-1".into());
        assert_eq!(missing.public_message(), denied.public_message());
        assert_ne!(missing.to_string(), denied.to_string());
    }

    #[test]
    fn transition_error_names_state_and_event() {
        let err = BookingError::InvalidTransition {
            from: BookingStatus::Cancelled,
            event: BookingEvent::Approve,
        };
        assert_eq!(err.to_string(), "cannot approve a booking that is cancelled");
    }
}
