use serde::{Deserialize, Serialize};

use crate::{
    core::{clock::DecimalHour, prices::PriceWindow, working_mode::WorkMode},
    error::PlanError,
};

/// A recurring daily time window, possibly wrapping past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TariffPeriod {
    pub start: DecimalHour,
    pub end: DecimalHour,

    /// Charging may be forced from the grid during this period.
    #[serde(default)]
    pub force: bool,

    /// Minimum state-of-charge percent required to enter the associated mode.
    #[serde(default)]
    pub min_soc: Option<f64>,
}

impl TariffPeriod {
    pub const fn new(start: f64, end: f64) -> Self {
        Self {
            start: DecimalHour::new(start),
            end: DecimalHour::new(end),
            force: false,
            min_soc: None,
        }
    }

    pub const fn forced(start: f64, end: f64) -> Self {
        let mut period = Self::new(start, end);
        period.force = true;
        period
    }

    pub const fn with_min_soc(mut self, min_soc: f64) -> Self {
        self.min_soc = Some(min_soc);
        self
    }

    /// `start == end` means zero length: the period never matches.
    pub fn is_disabled(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, hour: DecimalHour) -> bool {
        if self.is_disabled() {
            return false;
        }
        let hour = hour.normalized().0;
        let (start, end) = (self.start.0, self.end.0);
        if start > end {
            // Wraps past midnight, e.g. 22:00 - 04:00.
            hour >= start || hour < end
        } else {
            hour >= start && hour < end
        }
    }

    /// Length in decimal hours.
    pub fn hours(&self) -> f64 {
        (self.end - self.start).rounded_to_minute().0
    }
}

/// A work mode and the daily window during which the tariff wants it.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ModePeriod {
    pub mode: WorkMode,
    pub period: TariffPeriod,
}

/// Named time-of-use profile: charging windows, peak windows and per-mode
/// windows, plus the hours at which fresh forecasts become available.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tariff {
    pub name: String,

    /// AM charging window, the usual force-charge candidate.
    pub off_peak1: TariffPeriod,

    /// PM charging window, for tariffs with a second cheap period.
    pub off_peak2: TariffPeriod,

    pub peak: TariffPeriod,
    pub peak2: TariffPeriod,

    #[serde(default)]
    pub default_mode: Option<WorkMode>,

    /// Declaration order matters: when several periods contain the same hour,
    /// the last declared one wins.
    #[serde(default)]
    pub mode_periods: Vec<ModePeriod>,

    /// Hours of day at which forecasts should be refreshed.
    pub forecast_hours: Vec<u32>,
}

impl Tariff {
    pub fn octopus_flux() -> Self {
        Self {
            name: "Octopus Flux".to_owned(),
            off_peak1: TariffPeriod::forced(2.0, 5.0),
            off_peak2: TariffPeriod::new(0.0, 0.0),
            peak: TariffPeriod::new(16.0, 19.0),
            peak2: TariffPeriod::new(0.0, 0.0),
            default_mode: Some(WorkMode::SelfUse),
            mode_periods: vec![ModePeriod {
                mode: WorkMode::FeedIn,
                period: TariffPeriod::new(16.0, 7.0).with_min_soc(75.0),
            }],
            forecast_hours: vec![21, 22, 23],
        }
    }

    pub fn intelligent_octopus() -> Self {
        Self {
            name: "Intelligent Octopus".to_owned(),
            off_peak1: TariffPeriod::forced(23.5, 5.5),
            off_peak2: TariffPeriod::new(0.0, 0.0),
            peak: TariffPeriod::new(0.0, 0.0),
            peak2: TariffPeriod::new(0.0, 0.0),
            default_mode: None,
            mode_periods: Vec::new(),
            forecast_hours: vec![22, 23],
        }
    }

    pub fn octopus_cosy() -> Self {
        Self {
            name: "Octopus Cosy".to_owned(),
            off_peak1: TariffPeriod::forced(4.0, 7.0),
            off_peak2: TariffPeriod::new(13.0, 16.0),
            peak: TariffPeriod::new(16.0, 19.0),
            peak2: TariffPeriod::new(0.0, 0.0),
            default_mode: None,
            mode_periods: Vec::new(),
            forecast_hours: vec![2, 3, 12],
        }
    }

    pub fn octopus_go() -> Self {
        Self {
            name: "Octopus Go".to_owned(),
            off_peak1: TariffPeriod::forced(0.5, 4.5),
            off_peak2: TariffPeriod::new(0.0, 0.0),
            peak: TariffPeriod::new(0.0, 0.0),
            peak2: TariffPeriod::new(0.0, 0.0),
            default_mode: None,
            mode_periods: Vec::new(),
            forecast_hours: vec![22, 23],
        }
    }

    /// The half-hourly priced tariff: its AM window is meant to be replaced
    /// with the optimiser's pick, see [`Tariff::apply_price_window`].
    pub fn agile_octopus() -> Self {
        Self {
            name: "Agile Octopus".to_owned(),
            off_peak1: TariffPeriod::forced(2.5, 5.0),
            off_peak2: TariffPeriod::new(0.0, 0.0),
            peak: TariffPeriod::new(16.0, 19.0),
            peak2: TariffPeriod::new(0.0, 0.0),
            default_mode: None,
            mode_periods: Vec::new(),
            forecast_hours: vec![22, 23],
        }
    }

    pub fn bg_driver() -> Self {
        Self {
            name: "British Gas Electric Driver".to_owned(),
            off_peak1: TariffPeriod::forced(0.0, 5.0),
            off_peak2: TariffPeriod::new(0.0, 0.0),
            peak: TariffPeriod::new(0.0, 0.0),
            peak2: TariffPeriod::new(0.0, 0.0),
            default_mode: None,
            mode_periods: Vec::new(),
            forecast_hours: vec![22, 23],
        }
    }

    pub fn custom() -> Self {
        Self {
            name: "Custom".to_owned(),
            off_peak1: TariffPeriod::forced(2.0, 5.0),
            off_peak2: TariffPeriod::new(15.0, 16.0),
            peak: TariffPeriod::new(16.0, 19.0),
            peak2: TariffPeriod::new(0.0, 0.0),
            default_mode: None,
            mode_periods: Vec::new(),
            forecast_hours: vec![22, 23],
        }
    }

    pub fn presets() -> Vec<Self> {
        vec![
            Self::octopus_flux(),
            Self::intelligent_octopus(),
            Self::octopus_cosy(),
            Self::octopus_go(),
            Self::agile_octopus(),
            Self::bg_driver(),
            Self::custom(),
        ]
    }

    /// Select a preset by a case-insensitive fragment of its name.
    ///
    /// The fragment must match exactly one preset: `flux` is fine, `octopus`
    /// is ambiguous.
    pub fn find(name: &str) -> Result<Self, PlanError> {
        let needle = name.to_lowercase();
        let mut found: Vec<Self> =
            Self::presets().into_iter().filter(|t| t.name.to_lowercase().contains(&needle)).collect();
        if found.len() == 1 {
            Ok(found.remove(0))
        } else {
            Err(PlanError::TariffNotFound(name.to_owned()))
        }
    }

    /// Overwrite the AM charging window with an optimised price window.
    ///
    /// This is the only mutation path into a tariff.
    pub fn apply_price_window(&mut self, window: &PriceWindow) {
        self.off_peak1.start = window.start;
        self.off_peak1.end = window.end;
    }

    /// Whether any declared period for the given mode contains the hour.
    pub fn mode_period_contains(&self, mode: WorkMode, hour: DecimalHour) -> bool {
        self.mode_periods.iter().any(|entry| entry.mode == mode && entry.period.contains(hour))
    }

    /// The work mode the tariff wants at the given hour, with the minimum
    /// state-of-charge percent it requires.
    ///
    /// When several declared periods contain the hour, the last declared one
    /// wins. Falls back to the default mode outside all periods.
    pub fn work_mode_at(&self, hour: DecimalHour) -> Option<(WorkMode, f64)> {
        let mut selected = self.default_mode.map(|mode| (mode, 0.0));
        for entry in &self.mode_periods {
            if entry.period.contains(hour) {
                selected = Some((entry.mode, entry.period.min_soc.unwrap_or(0.0)));
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// Verify containment across midnight.
    #[test]
    fn contains_wraps_past_midnight() {
        let period = TariffPeriod::new(22.0, 4.0);
        assert!(period.contains(DecimalHour(23.0)));
        assert!(period.contains(DecimalHour(1.0)));
        assert!(!period.contains(DecimalHour(10.0)));
    }

    #[test]
    fn contains_plain_period() {
        let period = TariffPeriod::new(2.0, 5.0);
        assert!(period.contains(DecimalHour(2.0)));
        assert!(period.contains(DecimalHour(4.99)));
        assert!(!period.contains(DecimalHour(5.0)));
    }

    #[test]
    fn degenerate_period_never_matches() {
        let period = TariffPeriod::new(3.0, 3.0);
        assert!(period.is_disabled());
        assert!(!period.contains(DecimalHour(3.0)));
    }

    #[test]
    fn period_length_wraps() {
        assert_relative_eq!(TariffPeriod::new(23.5, 5.5).hours(), 6.0);
        assert_relative_eq!(TariffPeriod::new(2.0, 5.0).hours(), 3.0);
    }

    #[test]
    fn find_unique_fragment() {
        assert_eq!(Tariff::find("flux").unwrap().name, "Octopus Flux");
        assert_eq!(Tariff::find("AGILE").unwrap().name, "Agile Octopus");
    }

    #[test]
    fn find_rejects_ambiguous_and_unknown() {
        assert!(matches!(Tariff::find("octopus"), Err(PlanError::TariffNotFound(_))));
        assert!(matches!(Tariff::find("edf"), Err(PlanError::TariffNotFound(_))));
    }

    #[test]
    fn apply_price_window_overwrites_am_window() {
        let mut tariff = Tariff::agile_octopus();
        let window = PriceWindow {
            start: DecimalHour(1.5),
            end: DecimalHour(4.5),
            span: 6,
            weighted_price: 5.0.into(),
        };
        tariff.apply_price_window(&window);
        assert_relative_eq!(tariff.off_peak1.start.0, 1.5);
        assert_relative_eq!(tariff.off_peak1.end.0, 4.5);
        assert!(tariff.off_peak1.force, "forcing is a property of the tariff, not the window");
    }

    /// Verify that the last declared period wins on overlap.
    #[test]
    fn later_mode_period_wins() {
        let mut tariff = Tariff::octopus_flux();
        tariff.mode_periods.push(ModePeriod {
            mode: WorkMode::Backup,
            period: TariffPeriod::new(18.0, 20.0).with_min_soc(30.0),
        });
        let (mode, min_soc) = tariff.work_mode_at(DecimalHour(18.5)).unwrap();
        assert_eq!(mode, WorkMode::Backup);
        assert_relative_eq!(min_soc, 30.0);
        let (mode, min_soc) = tariff.work_mode_at(DecimalHour(17.0)).unwrap();
        assert_eq!(mode, WorkMode::FeedIn);
        assert_relative_eq!(min_soc, 75.0);
        assert_eq!(tariff.work_mode_at(DecimalHour(10.0)).unwrap().0, WorkMode::SelfUse);
    }
}
