use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Business days granted after the due date before an installment is late.
pub const GRACE_BUSINESS_DAYS: u32 = 9;

/// Walks forward from `start` counting only Monday to Friday until `n`
/// business days have been counted. Holidays are not considered.
///
/// Returns `None` only when the walk runs past the end of the calendar.
pub fn add_business_days(start: NaiveDate, n: u32) -> Option<NaiveDate> {
    let mut current = start;
    let mut counted = 0;

    while counted < n {
        current = current.checked_add_days(Days::new(1))?;
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            counted += 1;
        }
    }

    Some(current)
}

/// Grace-period due date for an installment due on `due`.
pub fn grace_date(due: NaiveDate) -> Option<NaiveDate> {
    add_business_days(due, GRACE_BUSINESS_DAYS)
}
