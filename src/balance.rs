/// Tuning parameters for game balance.
/// Centralizes the curves that trade off cost, performance, and risk.

use crate::engine_design::{EngineCycle, FuelType};
use crate::flight_plan::EventKind;

// ==========================================
// Engine Complexity
// ==========================================

/// Complexity range for an engine fuel type.
#[derive(Debug, Clone, Copy)]
pub struct ComplexityRange {
    pub min: i32,
    pub max: i32,
    pub center: i32,
}

/// Exponent for complexity cost scaling: (complexity / center)^EXPONENT.
pub const COMPLEXITY_COST_EXPONENT: f64 = 2.0;

/// Get the complexity range for a given fuel type.
pub fn complexity_range(fuel_type: FuelType) -> ComplexityRange {
    match fuel_type {
        FuelType::Solid => ComplexityRange { min: 2, max: 4, center: 3 },
        FuelType::Kerolox => ComplexityRange { min: 4, max: 8, center: 6 },
        FuelType::Hydrolox => ComplexityRange { min: 5, max: 9, center: 7 },
        FuelType::Methalox => ComplexityRange { min: 5, max: 9, center: 7 },
        FuelType::Hypergolic => ComplexityRange { min: 1, max: 4, center: 2 },
    }
}

/// Cost multiplier from complexity: (complexity / center)^EXPONENT.
pub fn complexity_cost_multiplier(complexity: i32, center: i32) -> f64 {
    (complexity as f64 / center as f64).powf(COMPLEXITY_COST_EXPONENT)
}

/// Manufacturing price per kilogram of engine dry mass, before cycle and complexity multipliers.
pub fn engine_price_per_kg(fuel_type: FuelType) -> f64 {
    match fuel_type {
        FuelType::Kerolox => 22_000.0,
        FuelType::Hydrolox => 36_000.0,
        FuelType::Methalox => 25_000.0,
        FuelType::Hypergolic => 40_000.0,
        FuelType::Solid => 300.0,
    }
}

// ==========================================
// Engine Cycle Performance Multipliers
// ==========================================
// All values are relative to GasGenerator = 1.0.
// PressureFed: no turbopump, lightest and cheapest, low chamber pressure.
// Expander: closed cycle with heat-limited thrust (cryogenics only).
// StagedCombustion and FullFlow: high chamber pressure, heavy and expensive.

/// Thrust multiplier by engine cycle.
pub fn cycle_thrust_multiplier(cycle: EngineCycle) -> f64 {
    match cycle {
        EngineCycle::PressureFed => 0.6,
        EngineCycle::GasGenerator => 1.0,
        EngineCycle::Expander => 0.8,
        EngineCycle::StagedCombustion => 1.15,
        EngineCycle::FullFlowStagedCombustion => 1.3,
    }
}

/// Exhaust velocity (ISP) multiplier by engine cycle.
pub fn cycle_ve_multiplier(cycle: EngineCycle) -> f64 {
    match cycle {
        EngineCycle::PressureFed => 0.92,
        EngineCycle::GasGenerator => 1.0,
        EngineCycle::Expander => 1.04,
        EngineCycle::StagedCombustion => 1.06,
        EngineCycle::FullFlowStagedCombustion => 1.08,
    }
}

/// Mass multiplier by engine cycle. Strictly increasing with cycle tier.
pub fn cycle_mass_multiplier(cycle: EngineCycle) -> f64 {
    match cycle {
        EngineCycle::PressureFed => 0.7,
        EngineCycle::GasGenerator => 1.0,
        EngineCycle::Expander => 1.05,
        EngineCycle::StagedCombustion => 1.15,
        EngineCycle::FullFlowStagedCombustion => 1.3,
    }
}

/// Cost multiplier by engine cycle (on top of material cost and complexity).
pub fn cycle_cost_multiplier(cycle: EngineCycle) -> f64 {
    match cycle {
        EngineCycle::PressureFed => 0.4,
        EngineCycle::GasGenerator => 1.0,
        EngineCycle::Expander => 1.3,
        EngineCycle::StagedCombustion => 2.0,
        EngineCycle::FullFlowStagedCombustion => 3.0,
    }
}

// ==========================================
// Gravity Losses
// ==========================================

/// Width of the exponential TWR falloff above 1.0.
pub const GRAVITY_LOSS_TWR_WIDTH: f64 = 0.25;

/// At or above this TWR the loss fraction is exactly zero.
pub const GRAVITY_LOSS_NEGLIGIBLE_TWR: f64 = 4.0;

/// Fraction of a burn's delta-v lost to gravity as a function of thrust-to-weight.
///
/// - TWR ≤ 1.0: 1.0 (the vehicle cannot climb, everything is lost)
/// - 1.0 < TWR < 4.0: exp(-(TWR - 1) / 0.25), so 1.2 → 0.45, 1.5 → 0.135, 2.0 → 0.018
/// - TWR ≥ 4.0: 0.0
///
/// Non-increasing over the whole domain.
pub fn twr_loss_fraction(twr: f64) -> f64 {
    if twr <= 1.0 {
        1.0
    } else if twr >= GRAVITY_LOSS_NEGLIGIBLE_TWR {
        0.0
    } else {
        (-(twr - 1.0) / GRAVITY_LOSS_TWR_WIDTH).exp()
    }
}

/// Ascent-shape coefficients: how vertical a burn is, given the delta-v already achieved.
/// Early burns fight gravity directly, later burns are mostly horizontal (gravity turn).
pub mod ascent {
    /// Coefficient at launch (fully vertical)
    pub const MAX_COEFFICIENT: f64 = 1.0;
    /// Coefficient once the trajectory is nearly horizontal
    pub const MIN_COEFFICIENT: f64 = 1.0 / 18.0;
    /// Delta-v at which the trajectory is treated as horizontal
    pub const HORIZONTAL_DV: f64 = 5000.0;

    /// Exponential decay from MAX to MIN over [0, HORIZONTAL_DV].
    pub fn coefficient(cumulative_delta_v: f64) -> f64 {
        if cumulative_delta_v <= 0.0 {
            return MAX_COEFFICIENT;
        }
        if cumulative_delta_v >= HORIZONTAL_DV {
            return MIN_COEFFICIENT;
        }
        let decay_rate = (MAX_COEFFICIENT / MIN_COEFFICIENT).ln() / HORIZONTAL_DV;
        (MAX_COEFFICIENT * (-decay_rate * cumulative_delta_v).exp()).max(MIN_COEFFICIENT)
    }
}

/// Gravity loss for one burn phase. Never exceeds `ideal_delta_v`.
pub fn gravity_loss(ideal_delta_v: f64, twr: f64, cumulative_delta_v: f64) -> f64 {
    if ideal_delta_v <= 0.0 {
        return 0.0;
    }
    ideal_delta_v * twr_loss_fraction(twr) * ascent::coefficient(cumulative_delta_v)
}

// ==========================================
// Testing and Event Risk
// ==========================================

/// Lowest fraction of the nominal rate that testing can reach.
pub const TESTING_FLOOR: f64 = 0.2;

/// Testing level at which (1 - floor) of the reducible risk has decayed by 1/e.
pub const TESTING_DECAY_LEVEL: f64 = 4.0;

/// Multiplier applied to nominal failure rates for a cumulative testing level.
/// 1.0 untested, decreasing monotonically toward TESTING_FLOOR.
pub fn testing_factor(level: f64) -> f64 {
    let level = level.max(0.0);
    TESTING_FLOOR + (1.0 - TESTING_FLOOR) * (-level / TESTING_DECAY_LEVEL).exp()
}

/// Per-engine ignition failure probability before testing.
pub const ENGINE_IGNITION_FAILURE_RATE: f64 = 0.007;

/// Untested failure rate for events that do not depend on engine count.
/// Engine-driven events (ignition, transfer burns) are computed per engine instead.
pub fn nominal_failure_rate(kind: EventKind) -> f64 {
    match kind {
        EventKind::Ignition | EventKind::TransferBurn => ENGINE_IGNITION_FAILURE_RATE,
        EventKind::Liftoff => 0.02,
        EventKind::MaxQ => 0.05,
        EventKind::BoosterSeparation | EventKind::StageSeparation => 0.03,
        EventKind::OrbitInsertion => 0.02,
        EventKind::Landing => 0.04,
        EventKind::PayloadRelease => 0.02,
    }
}

// ==========================================
// Flaw Occurrence
// ==========================================

/// Engine flaw occurrence scales with how far complexity sits from the fuel's center.
pub fn engine_flaw_occurrence_multiplier(complexity: i32, center: i32) -> f64 {
    complexity as f64 / center as f64
}

/// Extra design flaw occurrence for every core stage beyond the first.
pub const DESIGN_FLAW_OCCURRENCE_PER_STAGE: f64 = 0.15;

pub fn design_flaw_occurrence_multiplier(core_stages: usize) -> f64 {
    1.0 + DESIGN_FLAW_OCCURRENCE_PER_STAGE * core_stages.saturating_sub(1) as f64
}
