use bon::Builder;
use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        battery::{BatteryState, DeratedCurrent},
        clock::{DecimalHour, daylight_delta, daylight_saving},
        config::{ChargeConfig, ConsumptionSpan},
        simulator::Simulator,
        tariff::{Tariff, TariffPeriod},
        timeline::{
            DailyReport, Forecast, MEDIUM_PROFILE, average_profile, rotate_to_horizon,
            scale_to_total, seasonal_daily_consumption, seasonal_sun, select_reports,
        },
        working_mode::WorkMode,
    },
    error::PlanError,
    prelude::*,
    quantity::{electrical::Amperes, energy::KilowattHours, power::Kilowatts},
};

/// Inverter rating and charger limit, from the device catalogue.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Device {
    pub power: Kilowatts,
    pub max_charge_current: Amperes,
}

impl Default for Device {
    fn default() -> Self {
        Self { power: Kilowatts(3.68), max_charge_current: Amperes(26.0) }
    }
}

/// How aggressively to use the off-peak window.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Deserialize, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ForceCharge {
    /// Schedule the charge but leave the force-charge flag alone.
    #[default]
    Off,

    /// Set the force-charge flag over the computed period.
    Schedule,

    /// Charge for the whole off-peak window.
    FullWindow,
}

impl ForceCharge {
    const fn level(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Schedule => 1,
            Self::FullWindow => 2,
        }
    }
}

/// Where the expected generation figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationSource {
    #[display("manual forecast")]
    Manual,

    #[display("Solcast forecast")]
    Solcast,

    #[display("forecast.solar forecast")]
    ForecastSolar,

    #[display("generation history")]
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HorizonDay {
    #[display("today")]
    Today,

    #[display("tomorrow")]
    Tomorrow,

    #[display("the day after tomorrow")]
    DayAfterTomorrow,
}

/// One inverter charge period setting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChargePeriod {
    pub enable: bool,
    pub start: DecimalHour,
    pub end: DecimalHour,
}

/// Work mode the tariff wants right now, and whether the battery can afford it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModeRecommendation {
    pub mode: WorkMode,
    pub required_soc: f64,
    pub allowed: bool,
}

/// Hourly projections behind the plan, for display.
#[derive(Debug, Clone, Serialize)]
pub struct PlanTimeline {
    pub generation: Vec<Kilowatts>,
    pub charge: Vec<Kilowatts>,
    pub consumption: Vec<Kilowatts>,
    pub discharge: Vec<Kilowatts>,
    pub residual: Vec<KilowattHours>,
}

/// The complete answer: how much to charge, when, and what the battery is
/// expected to do over the horizon.
#[derive(Debug, Clone, Serialize)]
pub struct ChargePlan {
    pub tariff: String,
    pub capacity: KilowattHours,
    pub reserve: KilowattHours,

    /// Whole hour the horizon starts at.
    pub base_hour: u32,

    pub daily_consumption: KilowattHours,
    pub expected_generation: KilowattHours,
    pub generation_source: GenerationSource,

    pub charge_needed: KilowattHours,

    /// Charge duration, decimal hours.
    pub duration: f64,

    /// A full-window charge was requested or forced.
    pub full_window: bool,

    pub periods: [ChargePeriod; 2],

    pub start_residual: KilowattHours,
    pub end_residual: KilowattHours,
    pub min_residual: KilowattHours,

    /// Decimal hour of the projected minimum, may run past 24.
    pub min_hour: f64,
    pub min_day: HorizonDay,

    /// Set when device settings should not be touched, with the reason.
    pub settings_frozen: Option<&'static str>,

    pub work_mode: Option<ModeRecommendation>,

    pub timeline: PlanTimeline,
}

/// Everything the planner needs for one decision, all passed in explicitly.
#[derive(Builder)]
pub struct ChargePlanner<'a> {
    /// UTC wall clock at the moment of planning.
    pub system_time: NaiveDateTime,

    pub tariff: &'a Tariff,
    pub config: &'a ChargeConfig,
    pub battery: &'a BatteryState,

    #[builder(default)]
    pub device: Device,

    #[builder(default)]
    pub force_charge: ForceCharge,

    /// Expected generation for tomorrow, overrides every provider.
    pub manual_forecast: Option<KilowattHours>,

    pub solcast: Option<&'a Forecast>,
    pub solar: Option<&'a Forecast>,

    #[builder(default)]
    pub consumption_history: &'a [DailyReport],

    #[builder(default)]
    pub generation_history: &'a [DailyReport],
}

fn round_time(hours: f64) -> f64 {
    DecimalHour(hours).normalized().rounded_to_minute().0
}

/// The ±15 minute guard band around a charging window.
fn guard_band(period: TariffPeriod) -> TariffPeriod {
    TariffPeriod::new(round_time(period.start.0 - 0.25), round_time(period.end.0 + 0.25))
}

impl ChargePlanner<'_> {
    /// Work out the charge needed before the next off-peak window.
    #[allow(clippy::too_many_lines)]
    pub fn plan(&self) -> Result<ChargePlan, PlanError> {
        let tariff = self.tariff;
        let config = self.config;
        let battery = self.battery;
        battery.ensure_online()?;

        // Local time and any clock change inside the horizon.
        let time_offset = daylight_saving(self.system_time);
        let now = self.system_time + TimeDelta::hours(i64::from(time_offset));
        let today = now.date();
        let tomorrow = today + TimeDelta::days(1);
        let day_after = today + TimeDelta::days(2);
        let base_hour = now.hour();
        let hour_now = f64::from(now.hour()) + f64::from(now.minute()) / 60.0;
        let hour_adjustment = daylight_delta(self.system_time, self.system_time + TimeDelta::days(2));
        let mut change_hour = 0_i64;
        if hour_adjustment != 0 {
            change_hour = if daylight_delta(self.system_time, tomorrow.and_time(NaiveTime::MIN))
                != 0
            {
                1
            } else if daylight_delta(
                tomorrow.and_time(NaiveTime::MIN),
                day_after.and_time(NaiveTime::MIN),
            ) != 0
            {
                25
            } else {
                49
            };
            if hour_adjustment > 0 {
                change_hour += 1;
            }
        }
        debug!(%today, base_hour, hour_adjustment, change_hour, "planning horizon");

        // Pick the sooner of the AM and PM charging windows.
        let force_am = if tariff.off_peak1.force { self.force_charge.level() } else { 0 };
        let force_pm = u8::from(tariff.off_peak2.force && self.force_charge != ForceCharge::Off);
        let time_to_am = round_time(tariff.off_peak1.start.0 - f64::from(base_hour));
        let time_to_pm = (tariff.off_peak2.start.0 > 0.0)
            .then(|| round_time(tariff.off_peak2.start.0 - f64::from(base_hour)));
        let no_go = guard_band(tariff.off_peak1).contains(DecimalHour(hour_now))
            || (time_to_pm.is_some()
                && guard_band(tariff.off_peak2).contains(DecimalHour(hour_now)));
        let mut settings_frozen =
            no_go.then_some("less than 15 minutes before or after a charging period");

        let charge_pm = time_to_pm.is_some_and(|time_to_pm| time_to_pm < time_to_am);
        let window = if charge_pm { tariff.off_peak2 } else { tariff.off_peak1 };
        let mut force_level = if charge_pm { force_pm } else { force_am };
        let start_at = window.start.0;
        let end_by = window.end.0;
        let charge_time = round_time(end_by - start_at);
        let time_to_start = if charge_pm { time_to_pm.unwrap_or(time_to_am) } else { time_to_am };
        let start_hour = f64::from(base_hour) + time_to_start;
        let mut time_to_next = time_to_start as i64;
        if hour_adjustment < 0 && start_hour > change_hour as f64 {
            // One hour less to charge after the clocks go forward.
            time_to_next -= 1;
        }
        let time_to_next = usize::try_from(time_to_next.max(0)).unwrap_or_default();
        let horizon = if charge_pm {
            time_to_am
        } else if let Some(time_to_pm) = time_to_pm {
            time_to_pm
        } else {
            time_to_am + 24.0
        };
        let run_time = usize::try_from((horizon + 0.99) as i64 + 1 + hour_adjustment)
            .unwrap_or_default()
            .max(time_to_next + 1);

        // Full charges are only scheduled into the AM window.
        let full_charge = !charge_pm
            && config.full_charge.as_ref().is_some_and(|rule| rule.applies_to(tomorrow));

        // Battery and pack parameters.
        let min_soc = config
            .min_soc
            .or(battery.min_soc)
            .ok_or(PlanError::MinSocUnavailable)?;
        let capacity = battery.estimate_capacity(config.capacity)?;
        let reserve = capacity * (min_soc / 100.0);
        let residual = battery.residual;
        let pack = config.battery.pack(battery);
        info!(
            count = pack.cell_count,
            %capacity,
            %residual,
            soc = battery.soc,
            min_soc,
            temperature = battery.temperature,
            "battery",
        );

        let mut charge_current =
            config.charge_current.unwrap_or(self.device.max_charge_current);
        match config.battery.derated_charge_current(battery.temperature, charge_current) {
            DeratedCurrent::Unchanged => {}
            DeratedCurrent::Limited(limit) => {
                if limit < charge_current {
                    info!(%charge_current, %limit, "cold battery, charge current reduced");
                    charge_current = limit;
                }
            }
            DeratedCurrent::FullCharge => {
                info!("very cold battery, full charge set");
                force_level = 2;
            }
        }

        // Power limits and losses from the pack model.
        let resistance = pack.resistance.0;
        let ocv = pack.ocv.0;
        let charge_power = charge_current.0 * (ocv + charge_current.0 * resistance) / 1000.0;
        let mut charge_limit = self.device.power.0 * config.grid_loss;
        if charge_power < 0.1 {
            warn!(%charge_current, "charge current is too low");
        } else if charge_power < charge_limit {
            charge_limit = charge_power;
        }
        let inverter_power = config
            .inverter_power
            .map_or_else(|| self.device.power.0.round() * 20.0, |power| power.0);
        let operating_loss = inverter_power / 1000.0;
        let bms_power = config.bms_power;
        let charge_loss = config.charge_loss.unwrap_or_else(|| {
            1.0 - charge_limit * 1000.0 * resistance / (ocv * ocv)
                - bms_power.0 / charge_limit / 1000.0
        });
        let discharge_current =
            config.discharge_current.unwrap_or(self.device.max_charge_current);
        let discharge_limit =
            self.device.power.0.min(discharge_current.0 * ocv / 1000.0);
        let export_limit =
            config.export_limit.unwrap_or(self.device.power).0 / config.discharge_loss;
        debug!(charge_limit, charge_loss, discharge_limit, export_limit, "device limits");

        // Today's history only counts once the day is mostly complete.
        let history_cutoff =
            if hour_now >= config.use_today { today } else { today - TimeDelta::days(1) };

        // Daily consumption and its hourly shape.
        let (consumption, shape) = if let Some(annual) = config.annual_consumption {
            (seasonal_daily_consumption(annual, now.month()), MEDIUM_PROFILE)
        } else {
            let days = config.consumption_days.clamp(1, 7);
            let weekday = match config.consumption_span {
                ConsumptionSpan::Week => None,
                ConsumptionSpan::Weekday => Some(tomorrow.weekday()),
            };
            let reports =
                select_reports(self.consumption_history, days, history_cutoff, weekday);
            average_profile(&reports, "consumption")?
        };
        info!(consumption, "daily consumption estimate, kWh");
        let consumption_timed =
            rotate_to_horizon(&scale_to_total(&shape, consumption)?, hour_now, run_time);

        // Expected generation, by source priority.
        let solcast = self
            .solcast
            .and_then(|forecast| forecast.timed(today, tomorrow, hour_now, run_time, time_offset))
            .map(|(value, timed)| adjusted(value, timed, config.solcast_adjust));
        let solar = self
            .solar
            .and_then(|forecast| forecast.timed(today, tomorrow, hour_now, run_time, 0))
            .map(|(value, timed)| adjusted(value, timed, config.solar_adjust));
        let (season, sun_profile) = seasonal_sun(now.month());
        let sun_sum: f64 = sun_profile.iter().sum();
        let sun_timed = rotate_to_horizon(sun_profile, hour_now, run_time);
        let shaped =
            |expected: f64| sun_timed.iter().map(|x| expected * x / sun_sum).collect::<Vec<f64>>();
        let (source, expected, generation_timed) =
            if let Some(manual) = self.manual_forecast {
                (GenerationSource::Manual, manual.0, shaped(manual.0))
            } else if let Some((value, timed)) = solcast {
                (GenerationSource::Solcast, value, timed)
            } else if let Some((value, timed)) = solar {
                (GenerationSource::ForecastSolar, value, timed)
            } else {
                let days = config.generation_days.clamp(1, 7);
                let tail =
                    select_reports(self.generation_history, days, history_cutoff, None);
                let average = tail.iter().map(|report| report.total).sum::<f64>()
                    / tail.len().max(1) as f64;
                if tail.is_empty() || average == 0.0 {
                    return Err(PlanError::NoForecastAvailable);
                }
                if config.forecast_selection && settings_frozen.is_none() {
                    settings_frozen = Some("no forecast available, using generation history");
                }
                (GenerationSource::History, average, shaped(average))
            };
        info!(%source, expected, season, "generation estimate, kWh");

        // Charge and discharge timelines after losses, capped at the device
        // limits and reshaped inside forced and timed-mode windows.
        let mut charge_timed: Vec<f64> =
            generation_timed.iter().map(|x| x * config.pv_loss).collect();
        let mut discharge_timed: Vec<f64> = consumption_timed
            .iter()
            .map(|x| x / config.discharge_loss + bms_power.kilowatts().0)
            .collect();
        let timed_mode = tariff.default_mode.is_some();
        for index in 0..run_time {
            let hour = DecimalHour(f64::from(base_hour) + index as f64);
            charge_timed[index] = charge_timed[index].min(charge_limit);
            discharge_timed[index] = discharge_timed[index].min(discharge_limit);
            let forced = (force_am == 1 && tariff.off_peak1.contains(hour))
                || (force_pm == 1 && tariff.off_peak2.contains(hour));
            if forced || (timed_mode && tariff.mode_period_contains(WorkMode::Backup, hour)) {
                // Nothing leaves the battery while it is held.
                discharge_timed[index] =
                    if charge_timed[index] == 0.0 { operating_loss } else { 0.0 };
            } else if timed_mode && tariff.mode_period_contains(WorkMode::FeedIn, hour) {
                // Generation feeds the grid first; only the excess over the
                // export limit still charges the battery.
                let (charge, discharge) = (charge_timed[index], discharge_timed[index]);
                discharge_timed[index] =
                    if charge >= discharge { 0.0 } else { discharge - charge };
                charge_timed[index] = if charge <= export_limit + discharge {
                    0.0
                } else {
                    charge - export_limit - discharge
                };
            }
        }

        // Project the residual with no charging added.
        let simulator = Simulator {
            capacity,
            reserve,
            bms_power,
            charge_loss,
            residual,
            part_hour: hour_now - f64::from(base_hour),
        };
        let as_kilowatts = |values: &[f64]| values.iter().copied().map(Kilowatts).collect::<Vec<_>>();
        let baseline = simulator.run(
            &as_kilowatts(&charge_timed),
            &as_kilowatts(&discharge_timed),
            Some(time_to_next),
        );
        let min_residual = baseline.min_residual;
        let min_hour = f64::from(base_hour) + baseline.min_index as f64;
        let min_day = if min_hour < 24.0 {
            HorizonDay::Today
        } else if min_hour <= 48.0 {
            HorizonDay::Tomorrow
        } else {
            HorizonDay::DayAfterTomorrow
        };
        let start_residual = baseline.residual_at(time_to_start);

        // Energy needed to keep the contingency margin above the reserve.
        let contingency = if config.is_special_day(tomorrow) && !charge_pm {
            config.special_contingency
        } else {
            config.contingency
        };
        let kwh_contingency = consumption * contingency / 100.0;
        let mut kwh_needed = reserve.0 + kwh_contingency - min_residual.0;

        let mut full_window = false;
        let (duration, end1, end_residual, timeline) = if min_residual > reserve
            && kwh_needed < config.min_kwh.0
            && !full_charge
        {
            info!(
                lowest_soc = (min_residual.0 / capacity.0 * 100.0).round(),
                %min_residual,
                kwh_contingency,
                "no charging is needed",
            );
            kwh_needed = 0.0;
            let timeline = PlanTimeline {
                generation: as_kilowatts(&generation_timed),
                charge: as_kilowatts(&charge_timed),
                consumption: as_kilowatts(&consumption_timed),
                discharge: as_kilowatts(&discharge_timed),
                residual: baseline.residual_timed.clone(),
            };
            (0.0, DecimalHour(start_at), start_residual, timeline)
        } else {
            info!(kwh_needed, kwh_contingency, contingency, %min_day, "charge needed");
            // Time to add the energy, with a taper allowance near the top.
            let charge_rate = charge_limit * charge_loss
                + discharge_timed.get(time_to_next).copied().unwrap_or_default();
            let taper =
                if start_residual.0 + kwh_needed >= capacity.0 * 0.95 { 10.0 / 60.0 } else { 0.0 };
            let mut hours = round_time(kwh_needed / charge_rate + taper);
            if full_charge
                || force_level == 2
                || hours > charge_time
                || start_residual.0 + kwh_needed > capacity.0 * 1.05
            {
                kwh_needed = capacity.0 - start_residual.0;
                hours = charge_time;
                full_window = true;
                info!(kwh_needed, "full charge time used");
            } else if hours < config.min_hours {
                hours = config.min_hours;
                info!("minimum charge time used");
            }
            let end1 = DecimalHour(round_time(start_at + hours));

            // Spread the charge over the window, weighting the partial hours
            // at either end, and displace the load it replaces.
            let start_timed = time_to_start;
            let end_timed = start_timed + hours;
            let last = (((time_to_next as f64) + hours + 2.0) as usize).min(run_time);
            for i in time_to_next..last {
                let j = i as f64 + 1.0;
                let i_f = i as f64;
                let t = if start_timed >= i_f && end_timed < j {
                    end_timed - start_timed
                } else if start_timed >= i_f && start_timed < j && end_timed >= j {
                    j - start_timed
                } else if end_timed > i_f && end_timed <= j && start_timed <= i_f {
                    end_timed - i_f
                } else if start_timed <= i_f && end_timed > j {
                    1.0
                } else {
                    0.0
                };
                charge_timed[i] = (charge_timed[i] + charge_limit * t).min(charge_limit);
                discharge_timed[i] *= 1.0 - t;
            }
            let reworked = simulator.run(
                &as_kilowatts(&charge_timed),
                &as_kilowatts(&discharge_timed),
                None,
            );
            let time_to_end =
                ((start_timed + hours) as usize + 1).min(run_time.saturating_sub(1));
            let kwh_added = reworked.residual_timed[time_to_end].0
                - baseline.residual_timed[time_to_end].0;
            let old_residual = baseline.residual_at(end_timed);
            let end_residual = KilowattHours((old_residual.0 + kwh_added).min(capacity.0));
            info!(
                minutes = (hours * 60.0) as u32,
                net_added = end_residual.0 - start_residual.0,
                %start_residual,
                %end_residual,
                "charging plan",
            );
            let timeline = PlanTimeline {
                generation: as_kilowatts(&generation_timed),
                charge: as_kilowatts(&charge_timed),
                consumption: as_kilowatts(&consumption_timed),
                discharge: as_kilowatts(&discharge_timed),
                residual: reworked.residual_timed,
            };
            (hours, end1, end_residual, timeline)
        };

        // Inverter charge period settings, shifted when the clocks change
        // before the charge starts.
        let start2 =
            if duration == 0.0 { start_at } else { round_time(end1.0 + 1.0 / 60.0) };
        let end2 = if force_level == 1
            && TariffPeriod::new(start_at, end_by).contains(DecimalHour(start2))
        {
            end_by
        } else {
            start2
        };
        let adjust = if hour_adjustment != 0 && start_hour > change_hour as f64 {
            hour_adjustment as f64
        } else {
            0.0
        };
        let periods = [
            ChargePeriod {
                enable: duration > 0.0,
                start: DecimalHour(round_time(start_at + adjust)),
                end: DecimalHour(round_time(end1.0 + adjust)),
            },
            ChargePeriod {
                enable: false,
                start: DecimalHour(round_time(start2 + adjust)),
                end: DecimalHour(round_time(end2 + adjust)),
            },
        ];

        // Timed work mode recommendation, gated by the SoC the mode requires.
        // Only externally settable modes are ever recommended.
        let work_mode = if timed_mode {
            tariff
                .work_mode_at(DecimalHour(hour_now))
                .filter(|(mode, _)| mode.is_settable())
                .map(|(mode, required_soc)| ModeRecommendation {
                    mode,
                    required_soc,
                    allowed: battery.soc >= required_soc,
                })
        } else {
            None
        };

        Ok(ChargePlan {
            tariff: tariff.name.clone(),
            capacity,
            reserve,
            base_hour,
            daily_consumption: KilowattHours(consumption),
            expected_generation: KilowattHours(expected),
            generation_source: source,
            charge_needed: KilowattHours(kwh_needed.max(0.0)),
            duration,
            full_window,
            periods,
            start_residual,
            end_residual,
            min_residual,
            min_hour,
            min_day,
            settings_frozen,
            work_mode,
            timeline,
        })
    }
}

fn adjusted(value: f64, timed: Vec<f64>, percent: f64) -> (f64, Vec<f64>) {
    if (percent - 100.0).abs() < f64::EPSILON {
        (value, timed)
    } else {
        (value * percent / 100.0, timed.iter().map(|x| x * percent / 100.0).collect())
    }
}
