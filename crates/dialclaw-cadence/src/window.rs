//! Time-window resolver — is "now" inside a configured window?
//!
//! Window strings come in two shapes: 12-hour ("9:00AM-12:30PM") and
//! 24-hour ("09:00-12:30"). Both sides are anchored to "now"'s calendar
//! date in the campaign-wide reference time zone; an end before the
//! start means the window spans midnight and the end rolls to the next
//! day. All comparisons are inclusive on both edges.

use chrono::{DateTime, NaiveTime, Timelike};
use chrono_tz::Tz;

use dialclaw_core::error::{DialClawError, Result};

/// Parse one clock time: "H:MM", "HH:MM", optionally suffixed AM/PM.
fn parse_clock(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    let upper = s.to_ascii_uppercase();
    let (digits, meridiem) = if let Some(rest) = upper.strip_suffix("AM") {
        (rest.trim(), Some(false))
    } else if let Some(rest) = upper.strip_suffix("PM") {
        (rest.trim(), Some(true))
    } else {
        (upper.as_str(), None)
    };

    let (h, m) = digits
        .split_once(':')
        .ok_or_else(|| DialClawError::Invalid(format!("bad clock time '{s}'")))?;
    let hour: u32 = h
        .trim()
        .parse()
        .map_err(|_| DialClawError::Invalid(format!("bad hour in '{s}'")))?;
    let minute: u32 = m
        .trim()
        .parse()
        .map_err(|_| DialClawError::Invalid(format!("bad minute in '{s}'")))?;

    let hour = match meridiem {
        Some(pm) => {
            if !(1..=12).contains(&hour) {
                return Err(DialClawError::Invalid(format!("bad 12h hour in '{s}'")));
            }
            // 12AM = 00, 12PM = 12
            match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, false) => h,
                (h, true) => h + 12,
            }
        }
        None => hour,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| DialClawError::Invalid(format!("out-of-range clock time '{s}'")))
}

/// Parse a window string into (start, end) local times.
pub fn parse_window(window: &str) -> Result<(NaiveTime, NaiveTime)> {
    // Accept ASCII hyphen and en dash between the two clock times
    let (start_str, end_str) = window
        .split_once('-')
        .or_else(|| window.split_once('–'))
        .ok_or_else(|| DialClawError::Invalid(format!("bad time window '{window}'")))?;
    Ok((parse_clock(start_str)?, parse_clock(end_str)?))
}

/// Whether `now` falls inside `window`, both anchored to now's calendar
/// date. End before start ⇒ the window spans midnight.
pub fn is_open_at(window: &str, now: DateTime<Tz>) -> Result<bool> {
    let (start, end) = parse_window(window)?;
    let now_local = now.naive_local();
    let date = now_local.date();

    let start_dt = date.and_time(start);
    let mut end_dt = date.and_time(end);
    if end < start {
        end_dt += chrono::Duration::days(1);
    }
    Ok(start_dt <= now_local && now_local <= end_dt)
}

/// Convenience used for logging: minutes into the day of a local instant.
pub fn minute_of_day(now: DateTime<Tz>) -> u32 {
    now.hour() * 60 + now.minute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn at(h: u32, m: u32) -> DateTime<Tz> {
        // Mid-March date avoids the 02:00 DST gap at these hours
        New_York.with_ymd_and_hms(2026, 3, 20, h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_24h() {
        let (s, e) = parse_window("09:00-17:30").unwrap();
        assert_eq!(s, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(e, NaiveTime::from_hms_opt(17, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_12h() {
        let (s, e) = parse_window("9:00AM-5:30PM").unwrap();
        assert_eq!(s, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(e, NaiveTime::from_hms_opt(17, 30, 0).unwrap());

        // Noon and midnight edge cases
        let (s, e) = parse_window("12:00AM-12:00PM").unwrap();
        assert_eq!(s, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(e, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_en_dash() {
        assert!(parse_window("09:00–12:00").is_ok());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_window("morning").is_err());
        assert!(parse_window("25:00-26:00").is_err());
        assert!(parse_window("9-17").is_err());
    }

    #[test]
    fn test_open_inclusive_edges() {
        assert!(is_open_at("09:00-17:00", at(9, 0)).unwrap());
        assert!(is_open_at("09:00-17:00", at(17, 0)).unwrap());
        assert!(is_open_at("09:00-17:00", at(12, 30)).unwrap());
        assert!(!is_open_at("09:00-17:00", at(8, 59)).unwrap());
        assert!(!is_open_at("09:00-17:00", at(17, 1)).unwrap());
    }

    #[test]
    fn test_overnight_window() {
        // 22:00 → 02:00 next day, anchored to today's date
        assert!(is_open_at("22:00-02:00", at(23, 30)).unwrap());
        assert!(!is_open_at("22:00-02:00", at(12, 0)).unwrap());
    }
}
