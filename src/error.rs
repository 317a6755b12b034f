use thiserror::Error;

use crate::engine_design::{EngineCycle, EngineId, FuelType};
use crate::flaw::FlawId;
use crate::launcher::SimulationId;
use crate::rocket_design::DesignId;

/// Rejected design input. Always returned to the caller, never clamped silently.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{cycle} is not a valid cycle for {fuel}")]
    InvalidCycle { fuel: FuelType, cycle: EngineCycle },
    #[error("engine scale {0} is outside the supported range [0.25, 4.0]")]
    ScaleOutOfRange(f64),
    #[error("a stage needs at least one engine")]
    ZeroEngineStage,
    /// `max` shrinks below 0.95 for fuels with heavy tank structure
    #[error("mass fraction {value} is outside [{min:.3}, {max:.3}] for a {fuel} stage")]
    MassFractionOutOfRange {
        fuel: FuelType,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("solid motor stages have a fixed mass fraction")]
    FixedMassFraction,
    #[error("first stage cannot be a booster")]
    BoosterAtFirstStage,
    #[error("stage {index} cannot be a booster: stage {below} below it is already a booster")]
    BoosterWithoutCore { index: usize, below: usize },
    #[error("stage {index} cannot be a booster: booster stage {above} is attached to it")]
    BoosterUnderBooster { index: usize, above: usize },
    #[error("stage index {index} out of range (design has {len} stages)")]
    StageIndexOutOfRange { index: usize, len: usize },
    #[error("{field} must be non-negative, got {value}")]
    NegativeValue { field: &'static str, value: f64 },
    #[error("design has no stages")]
    EmptyDesign,
    #[error("unknown location '{0}'")]
    UnknownLocation(String),
    #[error("no direct transfer from '{from}' to '{to}'")]
    NoDirectTransfer { from: String, to: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlawError {
    #[error("unknown flaw {0}")]
    UnknownFlaw(FlawId),
    #[error("flaw {0} has not been discovered yet")]
    NotDiscovered(FlawId),
    #[error("flaw {0} is already fixed")]
    AlreadyFixed(FlawId),
    #[error("fixing flaw costs {needed:.0}, only {available:.0} available")]
    InsufficientFunds { needed: f64, available: f64 },
}

/// Programmer misuse of the launch API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("no simulation with id {0}")]
    UnknownSimulation(SimulationId),
    #[error("simulation {0} is already complete")]
    AlreadyComplete(SimulationId),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid flaw template '{key}': {reason}")]
    InvalidTemplate { key: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    #[error("no engine with id {0}")]
    UnknownEngine(EngineId),
    #[error("no design with id {0}")]
    UnknownDesign(DesignId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Flaw(#[from] FlawError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}
