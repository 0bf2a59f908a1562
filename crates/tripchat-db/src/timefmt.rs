//! Timestamp encoding for the TEXT columns.
//!
//! Fixed-width RFC 3339 with microseconds, so string order is time order.

use chrono::{DateTime, Duration, NaiveDateTime, SubsecRound, Utc};

use crate::store::StoreError;

const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// `now()`, or one microsecond after `prev` when the clock has not moved past it.
pub fn after(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = now();
    let floor = prev + Duration::microseconds(1);
    if now > floor { now } else { floor }
}

pub fn format(ts: DateTime<Utc>) -> String {
    ts.format(FORMAT).to_string()
}

pub fn parse(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(raw, FORMAT)
        .map(|ndt| ndt.and_utc())
        .map_err(|e| StoreError::Internal(format!("corrupt timestamp '{raw}': {e}")))
}

pub fn parse_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_round_trips_at_microsecond_precision() {
        let ts = now();
        assert_eq!(parse(&format(ts)).unwrap(), ts);
    }

    #[test]
    fn lexical_order_matches_time_order() {
        let a = now();
        let b = a + Duration::microseconds(1);
        let c = a + Duration::seconds(10);
        assert!(format(a) < format(b));
        assert!(format(b) < format(c));
    }

    #[test]
    fn after_is_strictly_later() {
        let future = now() + Duration::seconds(5);
        assert_eq!(after(future), future + Duration::microseconds(1));

        let past = now() - Duration::seconds(5);
        assert!(after(past) > past + Duration::microseconds(1));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("yesterday").is_err());
    }
}
