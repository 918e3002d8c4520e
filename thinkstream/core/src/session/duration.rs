//! Thinking Duration
//!
//! Durations are always derived from a session's two stored timestamps and
//! never stored themselves.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Elapsed time between two instants, clamped at zero
///
/// Clock adjustments can make `end` precede `start`; that reads as zero
/// rather than a negative duration.
#[must_use]
pub fn elapsed_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - start).to_std().unwrap_or(Duration::ZERO)
}

/// Format a duration for display
///
/// Whole milliseconds below one second (`"950ms"`), seconds with one decimal
/// otherwise (`"1.2s"`).
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sub_second_as_millis() {
        assert_eq!(format_elapsed(Duration::from_millis(950)), "950ms");
        assert_eq!(format_elapsed(Duration::from_millis(0)), "0ms");
        assert_eq!(format_elapsed(Duration::from_micros(999_900)), "999ms");
    }

    #[test]
    fn test_format_seconds_with_one_decimal() {
        assert_eq!(format_elapsed(Duration::from_millis(1000)), "1.0s");
        assert_eq!(format_elapsed(Duration::from_millis(1200)), "1.2s");
        assert_eq!(format_elapsed(Duration::from_millis(61_400)), "61.4s");
    }

    #[test]
    fn test_elapsed_clamps_negative() {
        let start = DateTime::<Utc>::from_timestamp(1_700_000_010, 0).unwrap();
        let end = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(elapsed_between(start, end), Duration::ZERO);
        assert_eq!(elapsed_between(end, start), Duration::from_secs(10));
    }
}
