use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::core::{clock::DecimalHour, solver::ForceCharge};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Work out the charge needed before the next off-peak period.
    #[clap(name = "plan")]
    Plan(PlanArgs),

    /// Find the cheapest charging window in a half-hourly price series.
    #[clap(name = "window")]
    Window(WindowArgs),

    /// List the built-in tariff presets.
    #[clap(name = "tariffs")]
    Tariffs,
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Scenario file with the battery snapshot, history and forecasts.
    #[clap(long = "scenario", env = "OWLET_SCENARIO")]
    pub scenario: PathBuf,

    /// Override the scenario tariff, by a fragment of the preset name.
    #[clap(long, env = "OWLET_TARIFF")]
    pub tariff: Option<String>,

    #[clap(long = "force-charge", value_enum, default_value = "off", env = "OWLET_FORCE_CHARGE")]
    pub force_charge: ForceCharge,

    /// Expected generation for tomorrow in kWh, overrides every provider.
    #[clap(long)]
    pub forecast: Option<f64>,

    /// Print the plan as JSON instead of tables.
    #[clap(long)]
    pub json: bool,

    /// Show the hourly projection under the plan summary.
    #[clap(long)]
    pub timeline: bool,
}

#[derive(Parser)]
pub struct WindowArgs {
    /// Scenario file carrying the price series.
    #[clap(long = "scenario", env = "OWLET_SCENARIO")]
    pub scenario: PathBuf,

    /// Charge duration in decimal hours.
    #[clap(long, default_value = "3.0")]
    pub duration: f64,

    /// Earliest start of the window.
    #[clap(long = "start-at", default_value = "23:00")]
    pub start_at: DecimalHour,

    /// Latest end of the window.
    #[clap(long = "end-by", default_value = "08:00")]
    pub end_by: DecimalHour,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_args() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
