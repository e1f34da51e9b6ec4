//! Timestamp helpers for run ids and cache freshness.

use chrono::{DateTime, Duration, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Format of run directory names; sorts lexicographically by time.
pub const RUN_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Returns the current UTC time as an ISO 8601 formatted string.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Builds a run id from a point in time.
#[must_use]
pub fn run_id_at(at: Timestamp) -> String {
    at.format(RUN_ID_FORMAT).to_string()
}

/// Window within which a cached model file is considered current.
#[must_use]
pub fn freshness_window() -> Duration {
    Duration::hours(24)
}

/// Returns true if `modified` lies strictly within `window` before `now`.
///
/// A file modified exactly `window` ago is stale. Timestamps in the future
/// (clock skew between us and the store) count as fresh.
#[must_use]
pub fn is_modified_within(modified: Timestamp, now: Timestamp, window: Duration) -> bool {
    now.signed_duration_since(modified) < window
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_run_id_sorts_by_time() {
        let earlier = run_id_at(noon());
        let later = run_id_at(noon() + Duration::seconds(1));

        assert_eq!(earlier, "20240310_120000");
        assert!(earlier < later);
    }

    #[test]
    fn test_exactly_24h_is_stale() {
        let modified = noon() - Duration::hours(24);
        assert!(!is_modified_within(modified, noon(), freshness_window()));
    }

    #[test]
    fn test_just_under_24h_is_fresh() {
        let modified = noon() - Duration::hours(24) + Duration::seconds(1);
        assert!(is_modified_within(modified, noon(), freshness_window()));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let modified = noon() + Duration::minutes(5);
        assert!(is_modified_within(modified, noon(), freshness_window()));
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }
}
