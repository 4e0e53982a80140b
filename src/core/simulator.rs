use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::{
    core::battery::interpolate,
    quantity::{
        energy::KilowattHours,
        power::{Kilowatts, Watts},
    },
};

/// Hour-by-hour battery model: fixed pack parameters plus the telemetry
/// snapshot the projection starts from.
#[derive(Debug, Clone)]
pub struct Simulator {
    pub capacity: KilowattHours,

    /// Residual below which the management system stops discharging.
    pub reserve: KilowattHours,

    /// Management system standby drain while the battery sits at the reserve.
    pub bms_power: Watts,

    /// Loss converting charge power to residual energy.
    pub charge_loss: f64,

    /// Residual at `hour_now`, from telemetry.
    pub residual: KilowattHours,

    /// How far into the current hour the snapshot was taken, decimal hours.
    pub part_hour: f64,
}

/// Projected residual for every hour of the horizon.
#[derive(Debug, Clone)]
pub struct Simulation {
    /// Residual at the start of each hour, index 0 is the current hour.
    pub residual_timed: Vec<KilowattHours>,

    pub min_residual: KilowattHours,

    /// Hours from the start of the horizon to the minimum; the earliest hour
    /// on a tie.
    pub min_index: usize,
}

impl Simulator {
    /// Step the residual through the charge and discharge timelines.
    ///
    /// Below the reserve the battery stops discharging and sits at a floor
    /// that decays with the standby drain; once the floor falls below 6% of
    /// capacity the management system recharges it back to the reserve. With
    /// `pin_horizon` set the floor only applies up to that hour, later hours
    /// run unprotected.
    ///
    /// The timelines are average powers per hour, so each entry is also the
    /// energy moved in that hour. The starting residual is backed off to the
    /// top of the current hour before stepping.
    pub fn run(
        &self,
        charge_timed: &[Kilowatts],
        discharge_timed: &[Kilowatts],
        pin_horizon: Option<usize>,
    ) -> Simulation {
        let delta: Vec<f64> = charge_timed
            .iter()
            .zip(discharge_timed)
            .map(|(charge, discharge)| charge.0 * self.charge_loss - discharge.0)
            .collect();
        let mut current = self.residual.0 - delta.first().copied().unwrap_or_default() * self.part_hour;
        let mut drain_floor = self.reserve.0;
        let mut residual_timed = Vec::with_capacity(delta.len());
        for (index, delta) in delta.iter().enumerate() {
            let pinned =
                current <= self.reserve.0 && pin_horizon.is_none_or(|limit| index <= limit);
            if pinned {
                if drain_floor < self.capacity.0 * 6.0 / 100.0 {
                    drain_floor = self.reserve.0;
                }
                current = drain_floor;
                drain_floor -= self.bms_power.kilowatts().0;
            } else {
                drain_floor = self.reserve.0;
            }
            current = current.clamp(0.0, self.capacity.0);
            residual_timed.push(KilowattHours(current));
            current += delta;
        }
        let min_index = residual_timed
            .iter()
            .position_min_by_key(|residual| OrderedFloat(residual.0))
            .unwrap_or_default();
        let min_residual = residual_timed.get(min_index).copied().unwrap_or_default();
        Simulation { residual_timed, min_residual, min_index }
    }
}

impl Simulation {
    /// Residual at a fractional hour offset, linearly interpolated.
    pub fn residual_at(&self, hours_from_base: f64) -> KilowattHours {
        let points: Vec<f64> = self.residual_timed.iter().map(|residual| residual.0).collect();
        KilowattHours(interpolate(hours_from_base, &points))
    }
}
