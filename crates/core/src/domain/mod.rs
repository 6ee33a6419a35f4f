pub mod booking;
pub mod report;

use chrono::{DateTime, SecondsFormat, Utc};

/// UTC timestamp in RFC 3339 form with a trailing `Z`.
pub fn utc_stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
