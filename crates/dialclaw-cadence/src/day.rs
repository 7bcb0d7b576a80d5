//! Day/age calculator — which cadence day is "today"?

use chrono::{DateTime, Utc};

/// 1-based cadence day for `now`, counted from `base`.
///
/// `offset` is 1 for a normal run; after a resume it is the recorded
/// `cadence_resume_day`, which re-bases the counter so the campaign
/// picks up where it was paused instead of restarting at day 1.
///
/// Returns `None` when the base instant hasn't been reached yet (the
/// caller skips, it is not an error).
pub fn cadence_day(base: DateTime<Utc>, now: DateTime<Utc>, offset: u32) -> Option<u32> {
    if now < base {
        return None;
    }
    let elapsed_hours = (now - base).num_hours();
    Some((elapsed_hours / 24) as u32 + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_first_day() {
        let base = Utc::now() - Duration::hours(3);
        assert_eq!(cadence_day(base, Utc::now(), 1), Some(1));
    }

    #[test]
    fn test_day_boundary() {
        let now = Utc::now();
        assert_eq!(cadence_day(now - Duration::hours(23), now, 1), Some(1));
        assert_eq!(cadence_day(now - Duration::hours(26), now, 1), Some(2));
        assert_eq!(cadence_day(now - Duration::hours(49), now, 1), Some(3));
    }

    #[test]
    fn test_resume_rebases() {
        let now = Utc::now();
        // Resumed 2h ago having paused on day 4: still day 4 today...
        assert_eq!(cadence_day(now - Duration::hours(2), now, 4), Some(4));
        // ...and day 5 tomorrow
        assert_eq!(cadence_day(now - Duration::hours(26), now, 4), Some(5));
    }

    #[test]
    fn test_future_base_skips() {
        let now = Utc::now();
        assert_eq!(cadence_day(now + Duration::hours(1), now, 1), None);
    }
}
