// Validation utilities module
// Custom validation functions for domain-specific rules, used via the
// validator crate's `custom` attribute on request types

use chrono::NaiveDate;
use rust_decimal::Decimal;
use validator::ValidationError;

/// Longest date span a single request may cover, in days.
/// Keeps per-cell capacity loops bounded.
pub const MAX_SPAN_DAYS: i64 = 365;

/// Validates that a currency code is a three-letter uppercase ISO 4217 code
pub fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_currency_code"))
    }
}

/// Validates that a monetary amount is non-negative
pub fn validate_non_negative_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() {
        Err(ValidationError::new("amount_must_be_non_negative"))
    } else {
        Ok(())
    }
}

/// Checks date ordering and span length for a (start, optional end) pair
///
/// Returns an error message suitable for a 400 response; callers map it into
/// their module's ValidationError variant.
pub fn check_date_range(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), String> {
    if let Some(end) = end {
        if end < start {
            return Err(format!(
                "end_date {} must not be before start_date {}",
                end, start
            ));
        }
        let span = (end - start).num_days() + 1;
        if span > MAX_SPAN_DAYS {
            return Err(format!(
                "date span of {} days exceeds the {}-day maximum",
                span, MAX_SPAN_DAYS
            ));
        }
    }
    Ok(())
}

/// Iterates every date in an inclusive range; end defaults to start
pub fn date_span(start: NaiveDate, end: Option<NaiveDate>) -> Vec<NaiveDate> {
    let end = end.unwrap_or(start);
    let mut dates = Vec::new();
    let mut day = start;
    while day <= end {
        dates.push(day);
        day = day.succ_opt().expect("date overflow");
    }
    dates
}
