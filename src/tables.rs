use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::core::{
    clock::DecimalHour,
    prices::PriceWindow,
    solver::ChargePlan,
    tariff::{Tariff, TariffPeriod},
};

fn base_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

fn format_period(period: TariffPeriod) -> String {
    if period.is_disabled() {
        "-".to_owned()
    } else if period.force {
        format!("{} - {} (forced)", period.start, period.end)
    } else {
        format!("{} - {}", period.start, period.end)
    }
}

pub fn build_plan_table(plan: &ChargePlan) -> Table {
    let soc = |residual: f64| (residual / plan.capacity.0 * 100.0).round();
    let mut table = base_table();
    table.add_row(vec![Cell::new("Tariff"), Cell::new(&plan.tariff)]);
    table.add_row(vec![
        Cell::new("Expected generation"),
        Cell::new(format!("{} ({})", plan.expected_generation, plan.generation_source)),
    ]);
    table.add_row(vec![
        Cell::new("Daily consumption"),
        Cell::new(plan.daily_consumption.to_string()),
    ]);
    table.add_row(vec![
        Cell::new("Lowest forecast"),
        Cell::new(format!(
            "{} ({:.0}%) at {} {}",
            plan.min_residual,
            soc(plan.min_residual.0),
            DecimalHour(plan.min_hour).normalized(),
            plan.min_day,
        ))
        .fg(if plan.min_residual <= plan.reserve { Color::Red } else { Color::Reset }),
    ]);
    table.add_row(vec![
        Cell::new("Charge needed"),
        Cell::new(plan.charge_needed.to_string()).fg(if plan.charge_needed.0 > 0.0 {
            Color::Green
        } else {
            Color::Reset
        }),
    ]);
    table.add_row(vec![
        Cell::new("Duration"),
        Cell::new(format!("{} min", (plan.duration * 60.0).round())),
    ]);
    for (index, period) in plan.periods.iter().enumerate() {
        table.add_row(vec![
            Cell::new(format!("Charge period {}", index + 1)),
            Cell::new(format!(
                "{} - {} ({})",
                period.start,
                period.end,
                if period.enable { "enabled" } else { "disabled" },
            )),
        ]);
    }
    table.add_row(vec![
        Cell::new("Start of charge"),
        Cell::new(format!("{} ({:.0}%)", plan.start_residual, soc(plan.start_residual.0))),
    ]);
    table.add_row(vec![
        Cell::new("End of charge"),
        Cell::new(format!("{} ({:.0}%)", plan.end_residual, soc(plan.end_residual.0))),
    ]);
    if let Some(recommendation) = plan.work_mode {
        table.add_row(vec![
            Cell::new("Work mode"),
            Cell::new(format!(
                "{:?} (needs {:.0}% SoC, {})",
                recommendation.mode,
                recommendation.required_soc,
                if recommendation.allowed { "allowed" } else { "not allowed" },
            )),
        ]);
    }
    if let Some(reason) = plan.settings_frozen {
        table.add_row(vec![
            Cell::new("Settings"),
            Cell::new(format!("frozen: {reason}")).fg(Color::DarkYellow),
        ]);
    }
    table
}

pub fn build_timeline_table(plan: &ChargePlan) -> Table {
    let mut table = base_table();
    table.set_header(vec![
        "Hour",
        "Generation",
        "Charge",
        "Consumption",
        "Discharge",
        "Residual",
        "SoC",
    ]);
    let timeline = &plan.timeline;
    for (index, residual) in timeline.residual.iter().enumerate() {
        let hour = DecimalHour(f64::from(plan.base_hour) + index as f64).normalized();
        table.add_row(vec![
            Cell::new(hour).add_attribute(Attribute::Dim),
            Cell::new(timeline.generation[index]).set_alignment(CellAlignment::Right),
            Cell::new(timeline.charge[index]).set_alignment(CellAlignment::Right),
            Cell::new(timeline.consumption[index]).set_alignment(CellAlignment::Right),
            Cell::new(timeline.discharge[index]).set_alignment(CellAlignment::Right),
            Cell::new(residual).set_alignment(CellAlignment::Right).fg(
                if *residual <= plan.reserve { Color::Red } else { Color::Reset },
            ),
            Cell::new(format!("{:.0}%", residual.0 / plan.capacity.0 * 100.0))
                .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn build_window_table(window: &PriceWindow) -> Table {
    let mut table = base_table();
    table.set_header(vec!["Start", "End", "Slots", "Weighted price"]);
    table.add_row(vec![
        Cell::new(window.start),
        Cell::new(window.end).add_attribute(Attribute::Dim),
        Cell::new(window.span).set_alignment(CellAlignment::Right),
        Cell::new(window.weighted_price).set_alignment(CellAlignment::Right).fg(Color::Green),
    ]);
    table
}

pub fn build_tariffs_table(tariffs: &[Tariff]) -> Table {
    let mut table = base_table();
    table.set_header(vec![
        "Name",
        "Off-peak 1",
        "Off-peak 2",
        "Peak",
        "Default mode",
        "Forecast hours",
    ]);
    for tariff in tariffs {
        table.add_row(vec![
            Cell::new(&tariff.name).add_attribute(Attribute::Bold),
            Cell::new(format_period(tariff.off_peak1)),
            Cell::new(format_period(tariff.off_peak2)),
            Cell::new(format_period(tariff.peak)),
            Cell::new(
                tariff.default_mode.map_or_else(|| "-".to_owned(), |mode| format!("{mode:?}")),
            ),
            Cell::new(
                tariff
                    .forecast_hours
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        ]);
    }
    table
}
