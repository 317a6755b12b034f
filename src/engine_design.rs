use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::balance::{
    complexity_cost_multiplier, complexity_range, cycle_cost_multiplier, cycle_mass_multiplier,
    cycle_thrust_multiplier, cycle_ve_multiplier, engine_price_per_kg,
};
use crate::engine::costs;
use crate::error::ValidationError;

pub const ENGINE_SCALE_MIN: f64 = 0.25;
pub const ENGINE_SCALE_MAX: f64 = 4.0;

/// Index of an engine design in the company's engine registry
pub type EngineId = usize;

/// Chemical engine fuel types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    Kerolox,
    Hydrolox,
    Solid,
    Methalox,
    Hypergolic,
}

impl FuelType {
    pub const ALL: [FuelType; 5] = [
        FuelType::Kerolox,
        FuelType::Hydrolox,
        FuelType::Solid,
        FuelType::Methalox,
        FuelType::Hypergolic,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            FuelType::Kerolox => "Kerolox",
            FuelType::Hydrolox => "Hydrolox",
            FuelType::Solid => "Solid",
            FuelType::Methalox => "Methalox",
            FuelType::Hypergolic => "Hypergolic",
        }
    }

    pub fn is_solid(&self) -> bool {
        matches!(self, FuelType::Solid)
    }

    /// Tank structure as a fraction of propellant mass. Zero for solids,
    /// whose casing is part of the motor's own mass.
    pub fn tank_mass_ratio(&self) -> f64 {
        match self {
            FuelType::Kerolox => costs::KEROLOX_TANK_MASS_RATIO,
            FuelType::Hydrolox => costs::HYDROLOX_TANK_MASS_RATIO,
            FuelType::Methalox => costs::METHALOX_TANK_MASS_RATIO,
            FuelType::Hypergolic => costs::HYPERGOLIC_TANK_MASS_RATIO,
            FuelType::Solid => 0.0,
        }
    }

    pub fn propellant_density(&self) -> f64 {
        match self {
            FuelType::Kerolox => costs::KEROLOX_DENSITY_KG_M3,
            FuelType::Hydrolox => costs::HYDROLOX_DENSITY_KG_M3,
            FuelType::Methalox => costs::METHALOX_DENSITY_KG_M3,
            FuelType::Hypergolic => costs::HYPERGOLIC_DENSITY_KG_M3,
            FuelType::Solid => costs::SOLID_DENSITY_KG_M3,
        }
    }

    /// (dry mass kg, thrust kN, exhaust velocity m/s) at scale 1.0 with a gas-generator baseline
    fn base_figures(&self) -> (f64, f64, f64) {
        match self {
            FuelType::Kerolox => (450.0, 500.0, 3000.0),
            FuelType::Hydrolox => (300.0, 100.0, 4500.0),
            FuelType::Methalox => (400.0, 400.0, 3300.0),
            FuelType::Hypergolic => (200.0, 50.0, 2800.0),
            FuelType::Solid => (40_000.0, 8_000.0, 2650.0),
        }
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Engine cycle (pump type) determines how propellants are fed to the combustion chamber.
/// Variants are declared in tier order: each one is heavier and more expensive than the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineCycle {
    PressureFed,
    GasGenerator,
    Expander,
    StagedCombustion,
    FullFlowStagedCombustion,
}

impl EngineCycle {
    pub const ALL: [EngineCycle; 5] = [
        EngineCycle::PressureFed,
        EngineCycle::GasGenerator,
        EngineCycle::Expander,
        EngineCycle::StagedCombustion,
        EngineCycle::FullFlowStagedCombustion,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            EngineCycle::PressureFed => "Pressure-Fed",
            EngineCycle::GasGenerator => "Gas Generator",
            EngineCycle::Expander => "Expander",
            EngineCycle::StagedCombustion => "Staged Combustion",
            EngineCycle::FullFlowStagedCombustion => "Full-Flow Staged",
        }
    }

    /// Whether this cycle uses a turbopump (all except PressureFed)
    pub fn has_turbopump(&self) -> bool {
        !matches!(self, EngineCycle::PressureFed)
    }
}

impl fmt::Display for EngineCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Check if a (fuel, cycle) combination is valid
pub fn is_cycle_compatible(fuel: FuelType, cycle: EngineCycle) -> bool {
    cycle_complexity(fuel, cycle).is_some()
}

/// Complexity score of a (fuel, cycle) combination, None for invalid combinations.
/// This table is also the valid-cycle matrix.
pub fn cycle_complexity(fuel: FuelType, cycle: EngineCycle) -> Option<i32> {
    use EngineCycle::*;
    match (fuel, cycle) {
        (FuelType::Kerolox, PressureFed) => Some(4),
        (FuelType::Kerolox, GasGenerator) => Some(6),
        (FuelType::Kerolox, StagedCombustion) => Some(7),
        (FuelType::Kerolox, FullFlowStagedCombustion) => Some(8),

        (FuelType::Hydrolox | FuelType::Methalox, PressureFed) => Some(5),
        (FuelType::Hydrolox | FuelType::Methalox, GasGenerator) => Some(6),
        (FuelType::Hydrolox | FuelType::Methalox, Expander) => Some(7),
        (FuelType::Hydrolox | FuelType::Methalox, StagedCombustion) => Some(8),
        (FuelType::Hydrolox | FuelType::Methalox, FullFlowStagedCombustion) => Some(9),

        (FuelType::Hypergolic, PressureFed) => Some(1),
        (FuelType::Hypergolic, GasGenerator) => Some(2),
        (FuelType::Hypergolic, StagedCombustion) => Some(4),

        // Solid motors have a single fixed configuration
        (FuelType::Solid, PressureFed) => Some(3),

        _ => None,
    }
}

/// Get the default cycle for a fuel type
pub fn default_cycle(fuel: FuelType) -> EngineCycle {
    match fuel {
        FuelType::Kerolox => EngineCycle::GasGenerator,
        FuelType::Hydrolox => EngineCycle::Expander,
        FuelType::Methalox => EngineCycle::GasGenerator,
        FuelType::Hypergolic => EngineCycle::PressureFed,
        FuelType::Solid => EngineCycle::PressureFed,
    }
}

/// Get the list of valid cycles for a fuel type (in tier order)
pub fn valid_cycles_for_fuel(fuel: FuelType) -> Vec<EngineCycle> {
    EngineCycle::ALL
        .iter()
        .copied()
        .filter(|c| is_cycle_compatible(fuel, *c))
        .collect()
}

/// Derived, read-only performance of one engine type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub fuel: FuelType,
    pub cycle: EngineCycle,
    pub scale: f64,
    pub thrust_kn: f64,
    pub exhaust_velocity_ms: f64,
    pub dry_mass_kg: f64,
    pub cost: f64,
    pub complexity: i32,
    pub tank_mass_ratio: f64,
    pub propellant_density: f64,
    /// Propellant / total mass for solid motors, None for liquids
    pub fixed_mass_ratio: Option<f64>,
}

impl EngineStats {
    pub fn is_solid(&self) -> bool {
        self.fuel.is_solid()
    }

    /// Propellant mass flow of a single engine at full thrust in kg/s
    pub fn mass_flow_kg_s(&self) -> f64 {
        if self.exhaust_velocity_ms <= 0.0 {
            return 0.0;
        }
        self.thrust_kn * 1000.0 / self.exhaust_velocity_ms
    }
}

/// Compute engine performance for a (fuel, cycle, scale) triple.
///
/// Pure and deterministic. Thrust, mass and cost grow linearly with scale;
/// exhaust velocity depends only on fuel and cycle.
pub fn compute(fuel: FuelType, cycle: EngineCycle, scale: f64) -> Result<EngineStats, ValidationError> {
    validate_scale(scale)?;
    let complexity =
        cycle_complexity(fuel, cycle).ok_or(ValidationError::InvalidCycle { fuel, cycle })?;
    Ok(derive_stats(fuel, cycle, scale, complexity))
}

fn validate_scale(scale: f64) -> Result<(), ValidationError> {
    if !(ENGINE_SCALE_MIN..=ENGINE_SCALE_MAX).contains(&scale) {
        return Err(ValidationError::ScaleOutOfRange(scale));
    }
    Ok(())
}

fn derive_stats(fuel: FuelType, cycle: EngineCycle, scale: f64, complexity: i32) -> EngineStats {
    let (base_mass, base_thrust, base_ve) = fuel.base_figures();
    let dry_mass_kg = base_mass * scale * cycle_mass_multiplier(cycle);
    let center = complexity_range(fuel).center;
    let cost = dry_mass_kg
        * engine_price_per_kg(fuel)
        * complexity_cost_multiplier(complexity, center)
        * cycle_cost_multiplier(cycle);

    EngineStats {
        fuel,
        cycle,
        scale,
        thrust_kn: base_thrust * scale * cycle_thrust_multiplier(cycle),
        exhaust_velocity_ms: base_ve * cycle_ve_multiplier(cycle),
        dry_mass_kg,
        cost,
        complexity,
        tank_mass_ratio: fuel.tank_mass_ratio(),
        propellant_density: fuel.propellant_density(),
        fixed_mass_ratio: fuel.is_solid().then_some(costs::SOLID_MASS_RATIO),
    }
}

/// A player-editable engine. Mutators keep (fuel, cycle) valid and scale in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineDesign {
    pub name: String,
    fuel: FuelType,
    cycle: EngineCycle,
    scale: f64,
}

impl EngineDesign {
    pub fn new(
        name: impl Into<String>,
        fuel: FuelType,
        cycle: EngineCycle,
        scale: f64,
    ) -> Result<Self, ValidationError> {
        compute(fuel, cycle, scale)?;
        Ok(Self {
            name: name.into(),
            fuel,
            cycle,
            scale,
        })
    }

    /// Engine with the fuel's default cycle at scale 1.0
    pub fn with_defaults(fuel: FuelType) -> Self {
        Self {
            name: fuel.display_name().to_string(),
            fuel,
            cycle: default_cycle(fuel),
            scale: 1.0,
        }
    }

    pub fn fuel(&self) -> FuelType {
        self.fuel
    }

    pub fn cycle(&self) -> EngineCycle {
        self.cycle
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Set fuel type. If the current cycle is compatible with the new fuel, keep it;
    /// otherwise switch to the default cycle for the new fuel.
    /// Returns the cycle in effect afterwards.
    pub fn set_fuel(&mut self, fuel: FuelType) -> EngineCycle {
        if !is_cycle_compatible(fuel, self.cycle) {
            let reset = default_cycle(fuel);
            debug!(engine = %self.name, from = %self.cycle, to = %reset, "cycle reset after fuel change");
            self.cycle = reset;
        }
        self.fuel = fuel;
        self.cycle
    }

    /// Set the engine cycle. Incompatible cycles are rejected and leave the engine unchanged.
    pub fn set_cycle(&mut self, cycle: EngineCycle) -> Result<(), ValidationError> {
        if !is_cycle_compatible(self.fuel, cycle) {
            return Err(ValidationError::InvalidCycle {
                fuel: self.fuel,
                cycle,
            });
        }
        self.cycle = cycle;
        Ok(())
    }

    pub fn set_scale(&mut self, scale: f64) -> Result<(), ValidationError> {
        validate_scale(scale)?;
        self.scale = scale;
        Ok(())
    }

    pub fn stats(&self) -> EngineStats {
        let complexity = cycle_complexity(self.fuel, self.cycle)
            .unwrap_or_else(|| complexity_range(self.fuel).center);
        derive_stats(self.fuel, self.cycle, self.scale, complexity)
    }

    pub fn snapshot(&self, engine_id: EngineId) -> EngineSnapshot {
        EngineSnapshot {
            engine_id,
            name: self.name.clone(),
            stats: self.stats(),
        }
    }
}

/// Lightweight stats cache stored on a stage.
/// Avoids passing the full engine registry around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub engine_id: EngineId,
    pub name: String,
    pub stats: EngineStats,
}
