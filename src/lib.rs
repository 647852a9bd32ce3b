//! Booking and payment coordination for the student housing marketplace.
//!
//! Students request stays, owners approve or reject them, payments go
//! through a hosted checkout and are reconciled back into the booking, and
//! both sides are told about every committed change.

pub mod clients;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod notifications;
pub mod payments;
pub mod pricing;
pub mod service;
pub mod store;

pub use config::AppConfig;
pub use error::{BookingError, Result};
pub use lifecycle::{BookingEvent, PaymentPolicy};
pub use payments::PaymentOutcome;
pub use pricing::PricingPolicy;
pub use service::BookingService;
