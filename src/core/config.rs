use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::{
    core::battery::BatteryModelConfig,
    quantity::{
        electrical::Amperes,
        energy::KilowattHours,
        power::{Kilowatts, Watts},
    },
};

/// Which days feed the consumption average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumptionSpan {
    /// The last N days, whatever they are.
    #[default]
    Week,

    /// The last N days matching tomorrow's weekday.
    Weekday,
}

/// When a full charge is forced regardless of the computed need.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FullChargeRule {
    /// Day of month, 1-28.
    DayOfMonth(u8),

    /// `"daily"` or a weekday name (three letters are enough).
    Named(String),
}

impl FullChargeRule {
    /// Whether a full charge is due on the given date.
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        match self {
            Self::DayOfMonth(day) => date.day() == u32::from(*day),
            Self::Named(name) => {
                let name = name.to_lowercase();
                name == "daily"
                    || (name.len() >= 3 && weekday_name(date.weekday()).starts_with(&name))
            }
        }
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Every recognised planner tunable.
///
/// Unknown keys are rejected when deserialising, there is no free-form
/// overlay: if it is not listed here, it is not a setting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChargeConfig {
    /// Percent of daily consumption kept as margin above the reserve.
    pub contingency: f64,

    /// Margin for days when consumption might be higher.
    pub special_contingency: f64,

    /// `MM-DD` dates on which the special contingency applies.
    pub special_days: Vec<String>,

    /// Battery capacity override.
    pub capacity: Option<KilowattHours>,

    /// Minimum SoC percent override.
    pub min_soc: Option<f64>,

    /// Maximum battery charge current override.
    pub charge_current: Option<Amperes>,

    /// Maximum battery discharge current override.
    pub discharge_current: Option<Amperes>,

    /// Maximum export power override.
    pub export_limit: Option<Kilowatts>,

    /// Loss converting battery discharge power to grid power.
    pub discharge_loss: f64,

    /// Loss converting PV power to battery charge power.
    pub pv_loss: f64,

    /// Loss converting grid power to battery charge power.
    pub grid_loss: f64,

    /// Loss converting charge power to residual energy; derived from the
    /// pack resistance when not set.
    pub charge_loss: Option<f64>,

    /// Inverter standby consumption; derived from the device rating when not
    /// set.
    pub inverter_power: Option<Watts>,

    /// Battery management system standby consumption.
    pub bms_power: Watts,

    /// Days of history feeding the generation average, 1-7.
    pub generation_days: usize,

    /// Days of history feeding the consumption average, 1-7.
    pub consumption_days: usize,

    pub consumption_span: ConsumptionSpan,

    /// Hour of day after which today's history is complete enough to use.
    pub use_today: f64,

    /// Minimum charge duration worth scheduling, decimal hours.
    pub min_hours: f64,

    /// Minimum energy worth scheduling.
    pub min_kwh: KilowattHours,

    /// Percent adjustment applied to the Solcast forecast.
    pub solcast_adjust: f64,

    /// Percent adjustment applied to the forecast.solar forecast.
    pub solar_adjust: f64,

    /// Only update device settings when a real forecast was available.
    pub forecast_selection: bool,

    /// Annual consumption estimate; replaces the history average when set.
    pub annual_consumption: Option<KilowattHours>,

    pub full_charge: Option<FullChargeRule>,

    pub battery: BatteryModelConfig,
}

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            contingency: 20.0,
            special_contingency: 33.0,
            special_days: vec!["12-25".to_owned(), "12-26".to_owned(), "01-01".to_owned()],
            capacity: None,
            min_soc: None,
            charge_current: None,
            discharge_current: None,
            export_limit: None,
            discharge_loss: 0.97,
            pv_loss: 0.95,
            grid_loss: 0.95,
            charge_loss: None,
            inverter_power: None,
            bms_power: Watts(27.0),
            generation_days: 3,
            consumption_days: 3,
            consumption_span: ConsumptionSpan::Week,
            use_today: 21.0,
            min_hours: 0.25,
            min_kwh: KilowattHours(0.5),
            solcast_adjust: 100.0,
            solar_adjust: 100.0,
            forecast_selection: true,
            annual_consumption: None,
            full_charge: None,
            battery: BatteryModelConfig::default(),
        }
    }
}

impl ChargeConfig {
    pub fn is_special_day(&self, date: NaiveDate) -> bool {
        let key = date.format("%m-%d").to_string();
        self.special_days.iter().any(|day| *day == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = ChargeConfig::default();
        assert_eq!(config.contingency, 20.0);
        assert_eq!(config.bms_power, Watts(27.0));
        assert_eq!(config.consumption_span, ConsumptionSpan::Week);
        assert!(config.full_charge.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = toml::from_str::<ChargeConfig>("contingecy = 25\n").unwrap_err();
        assert!(error.to_string().contains("contingecy"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ChargeConfig = toml::from_str("contingency = 25\nmin_kwh = 1.0\n").unwrap();
        assert_eq!(config.contingency, 25.0);
        assert_eq!(config.min_kwh, KilowattHours(1.0));
        assert_eq!(config.discharge_loss, 0.97);
    }

    #[test]
    fn full_charge_rule_day_of_month() {
        let config: ChargeConfig = toml::from_str("full_charge = 14\n").unwrap();
        let rule = config.full_charge.unwrap();
        assert!(rule.applies_to(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()));
        assert!(!rule.applies_to(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()));
    }

    #[test]
    fn full_charge_rule_weekday_and_daily() {
        // 2024-06-14 is a Friday.
        let friday = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        assert!(FullChargeRule::Named("Fri".to_owned()).applies_to(friday));
        assert!(FullChargeRule::Named("friday".to_owned()).applies_to(friday));
        assert!(!FullChargeRule::Named("Mon".to_owned()).applies_to(friday));
        assert!(FullChargeRule::Named("daily".to_owned()).applies_to(friday));
        // Too short to be a weekday.
        assert!(!FullChargeRule::Named("fr".to_owned()).applies_to(friday));
    }

    #[test]
    fn special_days() {
        let config = ChargeConfig::default();
        assert!(config.is_special_day(NaiveDate::from_ymd_opt(2024, 12, 25).unwrap()));
        assert!(!config.is_special_day(NaiveDate::from_ymd_opt(2024, 11, 25).unwrap()));
    }
}
