use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BookingError, Result};

/// Status of a booking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    AlreadyBooked,
    Cancelled,
}

impl BookingStatus {
    /// No lifecycle transition leaves a terminal status
    pub fn is_terminal(self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::AlreadyBooked => "already_booked",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open stay interval `[check_in, check_out)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting empty or inverted intervals
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self> {
        if check_in >= check_out {
            return Err(BookingError::Validation(format!(
                "check-in {check_in} must be before check-out {check_out}"
            )));
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

/// Listing data the booking flow needs from the property catalogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub id: String,
    pub owner_id: String,
    /// Rate in integer currency units; per month or per day depending on pricing
    pub rate: i64,
}

/// One student's request to occupy one property for a date range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub property_id: String,
    pub student_id: String,
    pub owner_id: String,
    pub dates: DateRange,
    pub total_amount: u64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    /// Gateway reference of the payment that settled this booking
    pub paid_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}
