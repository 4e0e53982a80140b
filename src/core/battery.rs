use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::PlanError,
    quantity::{
        electrical::{Amperes, Ohms, Volts},
        energy::KilowattHours,
        power::Kilowatts,
    },
};

/// Battery open-circuit voltage from 0% to 100% SoC in 10% steps.
pub const LIFEPO4_CURVE: [f64; 11] =
    [51.31, 51.84, 52.41, 52.45, 52.50, 52.64, 52.97, 53.10, 53.16, 53.63, 55.00];

/// Linear interpolation over equally spaced points by fractional index,
/// clamped to the first and last point outside the range.
pub fn interpolate(index: f64, points: &[f64]) -> f64 {
    let Some((first, last)) = points.first().zip(points.last()) else {
        return 0.0;
    };
    if index < 0.0 {
        return *first;
    }
    if index >= (points.len() - 1) as f64 {
        return *last;
    }
    let whole = index as usize;
    let fraction = index - whole as f64;
    points[whole] * (1.0 - fraction) + points[whole + 1] * fraction
}

/// Live battery telemetry, one snapshot per invocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatteryState {
    /// State of charge, percent.
    pub soc: f64,

    pub residual: KilowattHours,
    pub voltage: Volts,
    pub current: Amperes,

    /// Negative while charging.
    pub power: Kilowatts,

    /// Battery temperature, °C.
    pub temperature: f64,

    /// Minimum on-grid SoC percent reported by the device.
    #[serde(default)]
    pub min_soc: Option<f64>,

    /// Capacity reported by the device, when it reports one.
    #[serde(default)]
    pub capacity: Option<KilowattHours>,

    /// Cleared when the telemetry source flags the snapshot as invalid.
    #[serde(default = "default_online")]
    pub online: bool,
}

const fn default_online() -> bool {
    true
}

impl BatteryState {
    pub fn ensure_online(&self) -> Result<(), PlanError> {
        if self.online { Ok(()) } else { Err(PlanError::BatteryTelemetryUnavailable) }
    }

    /// Usable capacity: the explicit override, the device-reported value, or
    /// an estimate from residual energy and state of charge.
    ///
    /// Never guesses: without any of those this is a hard stop.
    pub fn estimate_capacity(
        &self,
        type_override: Option<KilowattHours>,
    ) -> Result<KilowattHours, PlanError> {
        if let Some(capacity) = type_override.or(self.capacity) {
            return Ok(capacity);
        }
        if self.residual > KilowattHours::ZERO && self.soc > 0.0 {
            Ok(self.residual / (self.soc / 100.0))
        } else {
            Err(PlanError::CapacityUnavailable)
        }
    }
}

/// Outcome of temperature derating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeratedCurrent {
    /// No derating applies.
    Unchanged,

    /// Cold battery: maximum charge current is reduced.
    Limited(Amperes),

    /// So cold that the derating table runs out: charge for the whole window
    /// instead of limiting the current.
    FullCharge,
}

/// Physical parameters of the battery pack.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryModelConfig {
    /// Open-circuit voltage at 0%, 10%, … 100% SoC.
    pub volt_curve: [f64; 11],

    /// SoC percent at which the curve voltage is taken as nominal.
    pub nominal_soc: f64,

    /// Internal resistance of a single battery module.
    pub cell_resistance: Ohms,

    /// Temperature where cold derating starts, °C.
    pub derate_temp: f64,

    /// Width of one derating step, °C.
    pub derate_step: f64,

    /// Maximum charge current per derating step below `derate_temp`.
    pub derating: Vec<Amperes>,
}

impl Default for BatteryModelConfig {
    fn default() -> Self {
        Self {
            volt_curve: LIFEPO4_CURVE,
            nominal_soc: 60.0,
            cell_resistance: Ohms(0.072),
            derate_temp: 22.0,
            derate_step: 5.0,
            derating: vec![Amperes(24.0), Amperes(15.0), Amperes(10.0), Amperes(2.0)],
        }
    }
}

impl BatteryModelConfig {
    /// Open-circuit voltage at the given SoC percent.
    pub fn ocv_at(&self, soc: f64) -> Volts {
        Volts(interpolate(soc / 10.0, &self.volt_curve))
    }

    pub fn nominal_voltage(&self) -> Volts {
        self.ocv_at(self.nominal_soc)
    }

    /// Characterise the whole pack from one telemetry snapshot.
    pub fn pack(&self, state: &BatteryState) -> Pack {
        let nominal = self.nominal_voltage();
        let cell_count = cell_count(state.voltage, nominal);
        let resistance = self.cell_resistance.per_pack(cell_count);
        // Correct the measured voltage for the load, then normalise it to the
        // nominal point of the curve.
        let loaded = state.voltage + state.current * resistance;
        let ocv = Volts(loaded.0 * nominal.0 / self.ocv_at(state.soc).0);
        Pack { cell_count, resistance, ocv }
    }

    /// Maximum charge current at the given battery temperature.
    pub fn derated_charge_current(&self, temperature: f64, base: Amperes) -> DeratedCurrent {
        if temperature > 36.0 {
            warn!(temperature, "high battery temperature may affect the charge rate");
            return DeratedCurrent::Unchanged;
        }
        if temperature.round() > self.derate_temp {
            return DeratedCurrent::Unchanged;
        }
        let step = if self.derate_step > 0.0 { self.derate_step } else { 1.0 };
        let index = ((self.derate_temp - temperature) / step) as usize;
        match self.derating.get(index) {
            Some(limit) => DeratedCurrent::Limited(limit.min(base)),
            None => DeratedCurrent::FullCharge,
        }
    }
}

/// Pack-level quantities derived from telemetry and the cell model.
#[derive(Debug, Clone, Copy)]
pub struct Pack {
    pub cell_count: u32,
    pub resistance: Ohms,

    /// Resistance-corrected open-circuit voltage.
    pub ocv: Volts,
}

/// Number of battery modules in series, from the measured pack voltage.
pub fn cell_count(voltage: Volts, nominal: Volts) -> u32 {
    (voltage.0 / nominal.0 + 0.5) as u32
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn state() -> BatteryState {
        BatteryState {
            soc: 50.0,
            residual: KilowattHours(5.0),
            voltage: Volts(52.6),
            current: Amperes(0.0),
            power: Kilowatts(0.0),
            temperature: 19.5,
            min_soc: Some(10.0),
            capacity: None,
            online: true,
        }
    }

    #[test]
    fn interpolate_clamps_outside_the_curve() {
        assert_relative_eq!(interpolate(-1.0, &LIFEPO4_CURVE), 51.31);
        assert_relative_eq!(interpolate(42.0, &LIFEPO4_CURVE), 55.00);
    }

    #[test]
    fn interpolate_between_points() {
        assert_relative_eq!(interpolate(0.5, &[1.0, 3.0, 5.0]), 2.0);
        assert_relative_eq!(interpolate(1.25, &[1.0, 3.0, 5.0]), 3.5);
    }

    #[test]
    fn ocv_at_curve_points() {
        let model = BatteryModelConfig::default();
        assert_relative_eq!(model.ocv_at(0.0).0, 51.31);
        assert_relative_eq!(model.ocv_at(100.0).0, 55.00);
        assert_relative_eq!(model.ocv_at(55.0).0, (52.64 + 52.97) / 2.0);
    }

    #[test]
    fn capacity_from_soc_and_residual() {
        let capacity = state().estimate_capacity(None).unwrap();
        assert_relative_eq!(capacity.0, 10.0);
    }

    #[test]
    fn capacity_override_wins() {
        let capacity = state().estimate_capacity(Some(KilowattHours(8.2))).unwrap();
        assert_relative_eq!(capacity.0, 8.2);
    }

    #[test]
    fn capacity_unresolvable_is_a_hard_stop() {
        let mut state = state();
        state.soc = 0.0;
        state.residual = KilowattHours::ZERO;
        assert!(matches!(state.estimate_capacity(None), Err(PlanError::CapacityUnavailable)));
    }

    #[test]
    fn offline_telemetry_is_rejected() {
        let mut state = state();
        state.online = false;
        assert!(matches!(state.ensure_online(), Err(PlanError::BatteryTelemetryUnavailable)));
    }

    /// Verify the derating breakpoints around the threshold.
    #[test]
    fn derating_at_the_threshold() {
        let model = BatteryModelConfig::default();
        // At the threshold exactly: first table entry.
        assert_eq!(
            model.derated_charge_current(22.0, Amperes(26.0)),
            DeratedCurrent::Limited(Amperes(24.0))
        );
        // One step below: second entry.
        assert_eq!(
            model.derated_charge_current(17.0, Amperes(26.0)),
            DeratedCurrent::Limited(Amperes(15.0))
        );
        // Warm battery: untouched.
        assert_eq!(model.derated_charge_current(25.0, Amperes(26.0)), DeratedCurrent::Unchanged);
        // Hot battery: untouched, warning only.
        assert_eq!(model.derated_charge_current(40.0, Amperes(26.0)), DeratedCurrent::Unchanged);
    }

    #[test]
    fn derating_never_raises_the_current() {
        let model = BatteryModelConfig::default();
        assert_eq!(
            model.derated_charge_current(22.0, Amperes(20.0)),
            DeratedCurrent::Limited(Amperes(20.0))
        );
    }

    #[test]
    fn derating_below_the_table_forces_full_charge() {
        let model = BatteryModelConfig::default();
        assert_eq!(model.derated_charge_current(-1.0, Amperes(26.0)), DeratedCurrent::FullCharge);
    }

    #[test]
    fn cell_count_rounds_to_nearest() {
        let nominal = Volts(52.97);
        assert_eq!(cell_count(Volts(52.6), nominal), 1);
        assert_eq!(cell_count(Volts(106.0), nominal), 2);
        assert_eq!(cell_count(Volts(211.9), nominal), 4);
    }
}
