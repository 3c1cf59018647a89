//! Wall-clock start times
//!
//! A run can be armed to start at the next occurrence of a time of day.

use chrono::{Local, NaiveDateTime, NaiveTime};
use std::time::Duration;
use tapcycle_core::{Error, Result};

/// Accepts `HH:MM:SS` or `HH:MM`
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime> {
    let trimmed = input.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| Error::invalid_time(input))
}

/// Time from `now` until the next `target`. A target earlier than `now`
/// means tomorrow; a target equal to `now` means immediately.
pub fn delay_until(now: NaiveDateTime, target: NaiveTime) -> Duration {
    let today = now.date().and_time(target);
    let at = if today < now {
        today + chrono::Duration::days(1)
    } else {
        today
    };
    (at - now).to_std().unwrap_or_default()
}

pub fn delay_until_local(target: NaiveTime) -> Duration {
    delay_until(Local::now().naive_local(), target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn later_today() {
        let target = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        assert_eq!(delay_until(at(9, 0, 0), target), Duration::from_secs(30 * 60));
    }

    #[test]
    fn already_passed_rolls_to_tomorrow() {
        let target = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        assert_eq!(
            delay_until(at(9, 0, 0), target),
            Duration::from_secs(23 * 3600)
        );
    }

    #[test]
    fn exact_match_is_immediate() {
        let target = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(delay_until(at(9, 0, 0), target), Duration::ZERO);
    }

    #[test]
    fn parses_both_forms() {
        assert_eq!(
            parse_time_of_day("07:05:09").unwrap(),
            NaiveTime::from_hms_opt(7, 5, 9).unwrap()
        );
        assert_eq!(
            parse_time_of_day(" 23:59 ").unwrap(),
            NaiveTime::from_hms_opt(23, 59, 0).unwrap()
        );
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("noon").is_err());
    }
}
