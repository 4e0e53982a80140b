use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// A point in a 24-hour cycle, in decimal hours.
///
/// All scheduling arithmetic runs on this unit: `2.5` is 02:30. Values wrap
/// around midnight, see [`DecimalHour::normalized`].
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    PartialOrd,
    Deserialize,
    Serialize,
    derive_more::Add,
    derive_more::From,
    derive_more::Neg,
    derive_more::Sub,
)]
pub struct DecimalHour(pub f64);

impl DecimalHour {
    pub const MIDNIGHT: Self = Self(0.0);

    pub const fn new(hours: f64) -> Self {
        Self(hours)
    }

    /// Wrap into `[0, 24)` by repeated ±24.
    pub fn normalized(self) -> Self {
        let mut hours = self.0;
        while hours < 0.0 {
            hours += 24.0;
        }
        while hours >= 24.0 {
            hours -= 24.0;
        }
        Self(hours)
    }

    /// Wrap around midnight and round to the nearest minute.
    ///
    /// Used after every arithmetic step so that sub-minute float noise never
    /// leaks into schedules.
    pub fn rounded_to_minute(self) -> Self {
        let hours = self.normalized().0;
        // 23:59:59.9 rounds up to 24:00, normalize again.
        Self(hours.trunc() + (60.0 * hours.fract() + 0.5).trunc() / 60.0).normalized()
    }

    pub fn min(self, rhs: Self) -> Self {
        Self(self.0.min(rhs.0))
    }

    /// Format as `HH:MM`, or `HH:MM:SS` when `seconds` is set.
    ///
    /// The inverse of parsing: formatting a parsed `HH:MM` string reproduces it.
    pub fn format(self, seconds: bool) -> String {
        // Round to the whole second first: a parsed "HH:MM" is not exactly
        // representable, and truncating it would print one minute low.
        let total_seconds = (self.normalized().0 * 3600.0).round() as u32;
        let text = format!(
            "{:02}:{:02}:{:02}",
            total_seconds / 3600 % 24,
            total_seconds / 60 % 60,
            total_seconds % 60,
        );
        let length = if seconds { 8 } else { 5 };
        text.chars().take(length).collect()
    }
}

impl FromStr for DecimalHour {
    type Err = PlanError;

    /// Parse `HH`, `HH:MM` or `HH:MM:SS`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || PlanError::InvalidTimeFormat(text.to_owned());
        let parts: Vec<&str> = text.split(':').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid());
        }
        let mut hours = 0.0;
        for (part, scale) in parts.iter().zip([1.0, 60.0, 3600.0]) {
            let value: u32 = part.parse().map_err(|_| invalid())?;
            hours += f64::from(value) / scale;
        }
        Ok(Self(hours))
    }
}

impl Display for DecimalHour {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format(false))
    }
}

impl Debug for DecimalHour {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format(true))
    }
}

/// Daylight-saving offset of the given civil timestamp: `1` inside the
/// last-Sunday-of-March to last-Sunday-of-October window, `0` outside.
///
/// On the transition days themselves the change happens at 01:00, so hours
/// before that still carry the previous offset.
pub fn daylight_saving(at: NaiveDateTime) -> u32 {
    let date = at.date();
    let start = last_sunday_of(date.year(), 3);
    let end = last_sunday_of(date.year(), 10);
    if date == start && at.hour() < 1 {
        0
    } else if date == end && at.hour() < 1 {
        1
    } else {
        u32::from(date >= start && date < end)
    }
}

/// Difference of daylight-saving offsets, non-zero when the clocks change
/// between the two timestamps.
pub fn daylight_delta(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    i64::from(daylight_saving(a)) - i64::from(daylight_saving(b))
}

fn last_sunday_of(year: i32, month: u32) -> NaiveDate {
    let last = NaiveDate::from_ymd_opt(year, month, 31).expect("the month has 31 days");
    last - TimeDelta::days(i64::from((last.weekday().num_days_from_monday() + 1) % 7))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn parse_hours_and_minutes() {
        assert_relative_eq!("02:30".parse::<DecimalHour>().unwrap().0, 2.5);
        assert_relative_eq!("23".parse::<DecimalHour>().unwrap().0, 23.0);
        assert_relative_eq!("01:30:36".parse::<DecimalHour>().unwrap().0, 1.51);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("2.5".parse::<DecimalHour>().is_err());
        assert!("two".parse::<DecimalHour>().is_err());
        assert!("1:2:3:4".parse::<DecimalHour>().is_err());
        assert!("12:-30".parse::<DecimalHour>().is_err());
    }

    /// Verify that formatting a parsed `HH:MM` string reproduces it, for
    /// every minute of the day. Many of them (01:40, 02:03, ...) parse to a
    /// float just below the exact minute.
    #[test]
    fn round_trip_to_the_minute() {
        for hour in 0..24 {
            for minute in 0..60 {
                let text = format!("{hour:02}:{minute:02}");
                assert_eq!(text.parse::<DecimalHour>().unwrap().format(false), text);
            }
        }
    }

    #[test]
    fn format_with_seconds() {
        assert_eq!(DecimalHour(1.51).format(true), "01:30:36");
    }

    #[test]
    fn normalize_wraps_both_ways() {
        assert_relative_eq!(DecimalHour(-1.0).normalized().0, 23.0);
        assert_relative_eq!(DecimalHour(25.5).normalized().0, 1.5);
        assert_relative_eq!(DecimalHour(24.0).normalized().0, 0.0);
    }

    #[test]
    fn rounding_snaps_to_the_minute() {
        assert_relative_eq!(DecimalHour(2.499_9).rounded_to_minute().0, 2.5);
        assert_relative_eq!(DecimalHour(-18.0).rounded_to_minute().0, 6.0);
        // Just below midnight rounds up and wraps back into [0, 24).
        assert_relative_eq!(DecimalHour(23.999_9).rounded_to_minute().0, 0.0);
    }

    #[test]
    fn summer_time_window() {
        let inside = "2024-06-15T12:00:00".parse::<NaiveDateTime>().unwrap();
        let outside = "2024-12-15T12:00:00".parse::<NaiveDateTime>().unwrap();
        assert_eq!(daylight_saving(inside), 1);
        assert_eq!(daylight_saving(outside), 0);
    }

    /// Verify the tie-break at the transition instant: the change happens at
    /// 01:00 on the last Sunday.
    #[test]
    fn summer_time_boundaries() {
        let spring = "2024-03-31T00:30:00".parse::<NaiveDateTime>().unwrap();
        assert_eq!(daylight_saving(spring), 0);
        let spring_later = "2024-03-31T02:00:00".parse::<NaiveDateTime>().unwrap();
        assert_eq!(daylight_saving(spring_later), 1);
        let autumn = "2024-10-27T00:30:00".parse::<NaiveDateTime>().unwrap();
        assert_eq!(daylight_saving(autumn), 1);
        let autumn_later = "2024-10-27T02:00:00".parse::<NaiveDateTime>().unwrap();
        assert_eq!(daylight_saving(autumn_later), 0);
    }

    #[test]
    fn delta_detects_upcoming_change() {
        let before = "2024-03-30T12:00:00".parse::<NaiveDateTime>().unwrap();
        let after = "2024-04-01T12:00:00".parse::<NaiveDateTime>().unwrap();
        assert_eq!(daylight_delta(before, after), -1);
        assert_eq!(daylight_delta(after, before), 1);
        assert_eq!(daylight_delta(before, before), 0);
    }
}
