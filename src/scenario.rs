use std::{fs, path::Path};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        battery::BatteryState,
        config::ChargeConfig,
        prices::PricePoint,
        solver::Device,
        timeline::{DailyReport, Forecast},
    },
    prelude::*,
    quantity::energy::KilowattHours,
};

/// Offline snapshot of everything the planner would otherwise have to fetch:
/// telemetry, history, forecasts and prices, all in one TOML file.
///
/// Unknown keys are rejected, a typo never passes silently.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// UTC wall clock the plan is computed for.
    pub time: NaiveDateTime,

    /// Tariff preset, by a fragment of its name.
    pub tariff: String,

    pub battery: BatteryState,

    #[serde(default)]
    pub device: Device,

    #[serde(default)]
    pub config: ChargeConfig,

    /// Per-day consumption history, oldest first.
    #[serde(default)]
    pub consumption: Vec<DailyReport>,

    /// Per-day generation history, oldest first.
    #[serde(default)]
    pub generation: Vec<DailyReport>,

    /// Expected generation for tomorrow, overrides every provider.
    #[serde(default)]
    pub manual_forecast: Option<KilowattHours>,

    #[serde(default)]
    pub solcast: Option<Forecast>,

    #[serde(default)]
    pub solar: Option<Forecast>,

    /// Half-hourly price series for price-optimised tariffs.
    #[serde(default)]
    pub prices: Vec<PricePoint>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse `{}`", path.display()))
    }
}
