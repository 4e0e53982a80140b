mod cli;
mod core;
mod error;
mod prelude;
mod quantity;
mod scenario;
mod tables;

use clap::Parser;

use crate::{
    cli::{Args, Command, PlanArgs, WindowArgs},
    core::{
        prices::{WindowRequest, cheapest_window},
        solver::ChargePlanner,
        tariff::Tariff,
    },
    prelude::*,
    quantity::energy::KilowattHours,
    scenario::Scenario,
};

fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    match Args::parse().command {
        Command::Plan(args) => plan(&args),
        Command::Window(args) => window(&args),
        Command::Tariffs => {
            println!("{}", tables::build_tariffs_table(&Tariff::presets()));
            Ok(())
        }
    }
}

fn plan(args: &PlanArgs) -> Result {
    let scenario = Scenario::load(&args.scenario)?;
    let name = args.tariff.as_deref().unwrap_or(&scenario.tariff);
    let mut tariff = Tariff::find(name)?;
    info!(tariff = %tariff.name, time = %scenario.time, "planning");

    // A price series turns the charging window into the cheapest one.
    if !scenario.prices.is_empty() {
        let window = cheapest_window(&scenario.prices, &WindowRequest::default())?;
        info!(start = %window.start, end = %window.end, price = %window.weighted_price, "price window");
        tariff.apply_price_window(&window);
    }

    let plan = ChargePlanner::builder()
        .system_time(scenario.time)
        .tariff(&tariff)
        .config(&scenario.config)
        .battery(&scenario.battery)
        .device(scenario.device)
        .force_charge(args.force_charge)
        .maybe_manual_forecast(
            args.forecast.map(KilowattHours).or(scenario.manual_forecast),
        )
        .maybe_solcast(scenario.solcast.as_ref())
        .maybe_solar(scenario.solar.as_ref())
        .consumption_history(&scenario.consumption)
        .generation_history(&scenario.generation)
        .build()
        .plan()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{}", tables::build_plan_table(&plan));
        if args.timeline {
            println!("{}", tables::build_timeline_table(&plan));
        }
    }
    Ok(())
}

fn window(args: &WindowArgs) -> Result {
    let scenario = Scenario::load(&args.scenario)?;
    ensure!(!scenario.prices.is_empty(), "the scenario `{}` carries no prices", args.scenario.display());
    let request = WindowRequest {
        duration: args.duration,
        start_at: args.start_at,
        end_by: args.end_by,
        weighting: None,
    };
    let window = cheapest_window(&scenario.prices, &request)?;
    println!("{}", tables::build_window_table(&window));
    Ok(())
}
