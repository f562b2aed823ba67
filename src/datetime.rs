//! Date/time helpers for mail timestamps.
//!
//! Mail dates are kept as `DateTime<Utc>` in memory and as epoch
//! milliseconds on disk.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Default display format for mail dates.
pub const MAIL_DATE_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Format a UTC timestamp in the given timezone.
///
/// Falls back to UTC when the timezone name is unknown.
pub fn format_utc_datetime(dt: &DateTime<Utc>, timezone: &str, format: &str) -> String {
    match timezone.parse::<Tz>() {
        Ok(tz) => dt.with_timezone(&tz).format(format).to_string(),
        Err(_) => dt.format(format).to_string(),
    }
}

/// Format a mail date with [`MAIL_DATE_FORMAT`].
pub fn format_mail_date(dt: &DateTime<Utc>, timezone: &str) -> String {
    format_utc_datetime(dt, timezone, MAIL_DATE_FORMAT)
}

/// Convert a timestamp to epoch milliseconds.
pub fn to_epoch_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Convert epoch milliseconds back to a timestamp.
///
/// Returns `None` for values outside chrono's representable range.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
