use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};
use crate::models::DateRange;

/// How a property's rate turns into a booking total
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PricingPolicy {
    /// Rate is per month; partial months are billed as whole months
    #[default]
    Monthly,
    /// Rate is per day; both the check-in and check-out day are billed
    Daily,
}

/// Compute the total for a stay. Called once, when the booking is created.
pub fn total_amount(policy: PricingPolicy, rate: i64, dates: &DateRange) -> Result<u64> {
    let rate = u64::try_from(rate)
        .map_err(|_| BookingError::Validation(format!("negative rate {rate}")))?;

    let units = match policy {
        PricingPolicy::Monthly => billed_months(dates.check_in, dates.check_out),
        PricingPolicy::Daily => {
            // DateRange guarantees check_out > check_in
            (dates.check_out - dates.check_in).num_days() as u64 + 1
        }
    };

    rate.checked_mul(units)
        .ok_or_else(|| BookingError::Validation("booking total overflows".to_string()))
}

fn billed_months(check_in: NaiveDate, check_out: NaiveDate) -> u64 {
    let add = |n: u32| check_in.checked_add_months(Months::new(n));

    let mut whole = 0u32;
    while add(whole + 1).is_some_and(|d| d <= check_out) {
        whole += 1;
    }

    let months = whole.max(1);
    match add(months) {
        // leftover days past the last billed month cost another month
        Some(end) if end < check_out => u64::from(months) + 1,
        _ => u64::from(months),
    }
}
