//! Timestamp utilities
//!
//! All persisted timestamps are unix milliseconds (UTC).

use chrono::{DateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a timestamp to unix milliseconds for storage
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert stored unix milliseconds back to a timestamp
///
/// Out-of-range values clamp to the unix epoch.
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Age of `ts` relative to `now` in fractional hours, never negative
pub fn age_hours(ts: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - ts).num_milliseconds();
    if millis <= 0 {
        0.0
    } else {
        millis as f64 / 3_600_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_millis_roundtrip_preserves_instant() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(from_millis(to_millis(ts)), ts);
    }

    #[test]
    fn test_age_hours_past() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let ts = now - Duration::minutes(90);
        assert!((age_hours(ts, now) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_age_hours_future_is_zero() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let ts = now + Duration::hours(3);
        assert_eq!(age_hours(ts, now), 0.0);
    }

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800);
        assert!(timestamp.timestamp() < 4_102_444_800);
    }
}
