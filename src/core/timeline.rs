use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::{core::clock::DecimalHour, error::PlanError, quantity::energy::KilowattHours};

/// How consumption varies by hour across a day, busy household.
pub const HIGH_PROFILE: [f64; 24] = [
    20.0, 20.0, 20.0, 20.0, 20.0, 20.0, 40.0, 50.0, 70.0, 70.0, 70.0, 50.0, 50.0, 50.0, 50.0,
    70.0, 99.0, 99.0, 99.0, 70.0, 40.0, 35.0, 30.0, 30.0,
];

/// Typical household shape, the default when no history is available.
pub const MEDIUM_PROFILE: [f64; 24] = [
    28.0, 28.0, 28.0, 28.0, 28.0, 28.0, 36.0, 49.0, 65.0, 70.0, 65.0, 49.0, 44.0, 44.0, 49.0,
    63.0, 92.0, 99.0, 92.0, 63.0, 47.0, 39.0, 33.0, 31.0,
];

pub const FLAT_PROFILE: [f64; 24] = [50.0; 24];

/// How consumption varies by month across a year, January first.
pub const MEDIUM_SEASONALITY: [f64; 12] =
    [11.0, 11.0, 10.0, 10.0, 9.0, 9.0, 9.0, 9.0, 10.0, 10.0, 11.0, 12.0];

const WINTER_SUN: [f64; 24] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0, 20.0, 55.0, 85.0, 99.0, 85.0, 55.0, 20.0, 5.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];
const SPRING_SUN: [f64; 24] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0, 19.0, 40.0, 70.0, 90.0, 99.0, 90.0, 70.0, 40.0, 19.0,
    5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];
const SUMMER_SUN: [f64; 24] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0, 15.0, 30.0, 50.0, 80.0, 95.0, 99.0, 95.0, 80.0, 50.0,
    30.0, 15.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];
const AUTUMN_SUN: [f64; 24] = SPRING_SUN;

/// Seasonal daylight shape for the given month (1-12), with the season name.
pub fn seasonal_sun(month: u32) -> (&'static str, &'static [f64; 24]) {
    match (month / 3) % 4 {
        0 => ("Winter", &WINTER_SUN),
        1 => ("Spring", &SPRING_SUN),
        2 => ("Summer", &SUMMER_SUN),
        _ => ("Autumn", &AUTUMN_SUN),
    }
}

/// Daily consumption estimated from an annual total, shaped by the month.
pub fn seasonal_daily_consumption(annual: KilowattHours, month: u32) -> f64 {
    let weights_sum: f64 = MEDIUM_SEASONALITY.iter().sum();
    annual.0 / 365.0 * MEDIUM_SEASONALITY[(month - 1) as usize] / weights_sum * 12.0
}

/// Rotate a 24-value daily shape so index 0 is the current hour, then tile to
/// exactly `run_time` entries.
pub fn rotate_to_horizon(profile: &[f64], hour_now: f64, run_time: usize) -> Vec<f64> {
    let offset = (hour_now as usize) % profile.len();
    profile[offset..].iter().chain(&profile[..offset]).copied().cycle().take(run_time).collect()
}

/// Rescale a shape point-wise so it sums to the given daily total.
pub fn scale_to_total(profile: &[f64], daily_total: f64) -> Result<Vec<f64>, PlanError> {
    let sum: f64 = profile.iter().sum();
    if sum == 0.0 {
        return Err(PlanError::DegenerateProfile);
    }
    Ok(profile.iter().map(|value| value * daily_total / sum).collect())
}

/// One day of reported per-hour history, possibly incomplete.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,

    /// Reported daily total, kWh.
    pub total: f64,

    /// Per-hour values starting at midnight; shorter than 24 for a day still
    /// in progress.
    pub by_hour: Vec<f64>,
}

/// Pick the reports feeding a history average: the last `days` dated on or
/// before `cutoff`, optionally restricted to a single weekday.
pub fn select_reports(
    history: &[DailyReport],
    days: usize,
    cutoff: NaiveDate,
    weekday: Option<Weekday>,
) -> Vec<DailyReport> {
    let picked: Vec<DailyReport> = history
        .iter()
        .filter(|report| report.date <= cutoff)
        .filter(|report| weekday.is_none_or(|weekday| report.date.weekday() == weekday))
        .cloned()
        .collect();
    picked[picked.len().saturating_sub(days)..].to_vec()
}

/// Average several days of history into a daily total and a 24-hour shape.
///
/// Hours absent from a day are skipped in the per-hour means; an incomplete
/// day's total is normalised up to 24 hours before averaging. The shape is
/// rescaled so it sums to the average total.
pub fn average_profile(
    reports: &[DailyReport],
    what: &'static str,
) -> Result<(f64, [f64; 24]), PlanError> {
    if reports.is_empty() {
        return Err(PlanError::HistoryUnavailable(what));
    }
    let mut sums = [0.0; 24];
    let mut counts = [0_u32; 24];
    let mut totals = 0.0;
    for report in reports {
        let hours = report.by_hour.len().min(24);
        for (hour, value) in report.by_hour.iter().take(24).enumerate() {
            sums[hour] += value;
            counts[hour] += 1;
        }
        totals += report.total * if hours >= 1 { 24.0 / hours as f64 } else { 1.0 };
    }
    let daily_average = totals / reports.len() as f64;
    if daily_average == 0.0 {
        return Err(PlanError::HistoryUnavailable(what));
    }
    let mut by_hour = [0.0; 24];
    for hour in 0..24 {
        if counts[hour] != 0 {
            by_hour[hour] = sums[hour] / f64::from(counts[hour]);
        }
    }
    let shape_sum: f64 = by_hour.iter().sum();
    if shape_sum == 0.0 {
        return Err(PlanError::DegenerateProfile);
    }
    for value in &mut by_hour {
        *value *= daily_average / shape_sum;
    }
    Ok((daily_average, by_hour))
}

/// A third-party yield forecast: daily totals with hourly breakdowns, keyed
/// by date and hour of day.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Forecast {
    pub daily: BTreeMap<NaiveDate, ForecastDay>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ForecastDay {
    /// Forecast total for the day, kWh.
    pub kwh: f64,

    /// Forecast kWh by hour of day.
    pub hourly: BTreeMap<u32, f64>,
}

impl Forecast {
    /// Tomorrow's total plus an horizon-length timeline built from today's
    /// remaining hours and tomorrow's breakdown.
    ///
    /// `dst_offset` shifts the hour-of-day lookups, provider data is keyed in
    /// standard time. Returns `None` when tomorrow is not covered.
    pub fn timed(
        &self,
        today: NaiveDate,
        tomorrow: NaiveDate,
        hour_now: f64,
        run_time: usize,
        dst_offset: u32,
    ) -> Option<(f64, Vec<f64>)> {
        let day_ahead = self.daily.get(&tomorrow)?;
        let lookup = |day: &ForecastDay, hour: usize| {
            let key = DecimalHour(hour as f64 - f64::from(dst_offset)).rounded_to_minute().0 as u32;
            day.hourly.get(&key).copied().unwrap_or(0.0)
        };
        let mut timed: Vec<f64> = Vec::with_capacity(run_time);
        if let Some(day) = self.daily.get(&today) {
            timed.extend(((hour_now as usize)..24).map(|hour| lookup(day, hour)));
        } else {
            timed.extend(std::iter::repeat_n(0.0, 24 - hour_now as usize));
        }
        let profile: Vec<f64> = (0..24).map(|hour| lookup(day_ahead, hour)).collect();
        timed.extend(&profile);
        timed.extend(&profile);
        timed.truncate(run_time);
        Some((day_ahead.kwh, timed))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn rotation_starts_at_the_current_hour() {
        let profile: Vec<f64> = (0..24).map(f64::from).collect();
        let timed = rotate_to_horizon(&profile, 22.5, 5);
        assert_eq!(timed, vec![22.0, 23.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn rotation_tiles_past_a_full_day() {
        let profile: Vec<f64> = (0..24).map(f64::from).collect();
        let timed = rotate_to_horizon(&profile, 1.0, 26);
        assert_eq!(timed.len(), 26);
        assert_relative_eq!(timed[23], 0.0);
        assert_relative_eq!(timed[24], 1.0);
    }

    #[test]
    fn scaling_preserves_the_shape() {
        let scaled = scale_to_total(&[1.0, 3.0], 8.0).unwrap();
        assert_eq!(scaled, vec![2.0, 6.0]);
    }

    #[test]
    fn scaling_a_flat_zero_profile_fails() {
        assert!(matches!(scale_to_total(&[0.0; 24], 8.0), Err(PlanError::DegenerateProfile)));
    }

    #[test]
    fn report_selection_by_weekday_and_cutoff() {
        let history: Vec<DailyReport> = (1..=14_u32)
            .map(|day| DailyReport {
                date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
                total: f64::from(day),
                by_hour: vec![],
            })
            .collect();
        let cutoff = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        let week = select_reports(&history, 3, cutoff, None);
        assert_eq!(week.iter().map(|report| report.date.day()).collect::<Vec<_>>(), [12, 13, 14]);
        // 2024-01-02 and 2024-01-09 are the Tuesdays on or before the cutoff.
        let tuesdays = select_reports(&history, 3, cutoff, Some(Weekday::Tue));
        assert_eq!(tuesdays.iter().map(|report| report.date.day()).collect::<Vec<_>>(), [2, 9]);
        // Reports past the cutoff never feed the average.
        let earlier =
            select_reports(&history, 3, NaiveDate::from_ymd_opt(2024, 1, 13).unwrap(), None);
        assert_eq!(
            earlier.iter().map(|report| report.date.day()).collect::<Vec<_>>(),
            [11, 12, 13]
        );
    }

    #[test]
    fn averaging_skips_missing_hours() {
        let reports = [
            DailyReport {
                date: NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(),
                total: 24.0,
                by_hour: vec![1.0; 24],
            },
            // Half a day: the total is normalised up to 24 hours.
            DailyReport {
                date: NaiveDate::from_ymd_opt(2024, 6, 13).unwrap(),
                total: 24.0,
                by_hour: vec![3.0; 12],
            },
        ];
        let (average, by_hour) = average_profile(&reports, "consumption").unwrap();
        assert_relative_eq!(average, (24.0 + 48.0) / 2.0);
        // First half of the day averages 2.0, second half 1.0; the shape is
        // then rescaled to sum to 36.
        assert_relative_eq!(by_hour.iter().sum::<f64>(), 36.0);
        assert_relative_eq!(by_hour[0] / by_hour[23], 2.0);
    }

    #[test]
    fn averaging_nothing_fails() {
        assert!(matches!(
            average_profile(&[], "generation"),
            Err(PlanError::HistoryUnavailable("generation"))
        ));
    }

    #[test]
    fn forecast_timed_joins_today_and_tomorrow() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 6, 13).unwrap();
        let mut forecast = Forecast::default();
        forecast.daily.insert(
            today,
            ForecastDay { kwh: 5.0, hourly: (0..24).map(|h| (h, 1.0)).collect() },
        );
        forecast.daily.insert(
            tomorrow,
            ForecastDay { kwh: 7.0, hourly: (0..24).map(|h| (h, 2.0)).collect() },
        );
        let (total, timed) = forecast.timed(today, tomorrow, 22.0, 6, 0).unwrap();
        assert_relative_eq!(total, 7.0);
        assert_eq!(timed, vec![1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
    }

    /// Verify the hour shift: provider data is keyed in standard time.
    #[test]
    fn forecast_timed_applies_the_dst_offset() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 6, 13).unwrap();
        let mut forecast = Forecast::default();
        forecast
            .daily
            .insert(tomorrow, ForecastDay { kwh: 3.0, hourly: [(12, 3.0)].into_iter().collect() });
        let (_, timed) = forecast.timed(today, tomorrow, 23.0, 24, 1).unwrap();
        // Hour 13 local looks up hour 12 standard.
        assert_relative_eq!(timed[1 + 13], 3.0);
        assert_relative_eq!(timed[1 + 12], 0.0);
    }

    #[test]
    fn forecast_without_tomorrow_is_unusable() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 6, 13).unwrap();
        assert!(Forecast::default().timed(today, tomorrow, 12.0, 24, 0).is_none());
    }

    #[test]
    fn seasons_by_quarter() {
        assert_eq!(seasonal_sun(1).0, "Winter");
        assert_eq!(seasonal_sun(12).0, "Winter");
        assert_eq!(seasonal_sun(4).0, "Spring");
        assert_eq!(seasonal_sun(7).0, "Summer");
        assert_eq!(seasonal_sun(10).0, "Autumn");
    }
}
