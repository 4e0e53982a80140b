use thiserror::Error;

/// Everything that stops the planner from producing a plan.
///
/// None of these are retried here: retry and backoff policy belongs to whatever
/// fetches the telemetry, forecasts and prices before the planner runs.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid time `{0}`, expected `HH`, `HH:MM` or `HH:MM:SS`")]
    InvalidTimeFormat(String),

    #[error("`{0}` does not match exactly one tariff")]
    TariffNotFound(String),

    #[error("insufficient price data: needed {needed} half-hour slots, got {available}")]
    InsufficientPriceData { needed: usize, available: usize },

    #[error("battery telemetry is not available")]
    BatteryTelemetryUnavailable,

    #[error("battery capacity cannot be resolved, set the `capacity` override")]
    CapacityUnavailable,

    #[error("minimum SoC is not available, set the `min_soc` override")]
    MinSocUnavailable,

    #[error("profile sums to zero, cannot be scaled")]
    DegenerateProfile,

    #[error("no {0} history available")]
    HistoryUnavailable(&'static str),

    #[error("no generation forecast or history available")]
    NoForecastAvailable,
}
