//! Simulation core for a rocket-company game: engine and stage physics,
//! multi-stage rocket designs with parallel boosters, seeded latent flaws,
//! and event-by-event launch simulation over multi-leg missions.

pub mod balance;
pub mod company;
pub mod config;
pub mod engine;
pub mod engine_design;
pub mod error;
pub mod flaw;
pub mod flight_plan;
pub mod launcher;
pub mod location;
pub mod mission_plan;
pub mod rocket_design;
pub mod stage;
pub mod world_seed;

pub use company::Company;
pub use config::CoreConfig;
pub use engine_design::{EngineCycle, EngineDesign, EngineId, EngineStats, FuelType};
pub use error::{CatalogError, ConfigError, CoreError, FlawError, SimulationError, ValidationError};
pub use flaw::{FailureCause, Flaw, FlawCatalog, FlawId, FlawRegistry, FlawScope};
pub use flight_plan::TestingLevels;
pub use launcher::{EventOutcome, LaunchSimulation, LaunchSnapshot, LaunchStatus, SimulationId};
pub use mission_plan::MissionPlan;
pub use rocket_design::{DesignId, RocketDesign};
pub use stage::RocketStage;
pub use world_seed::WorldSeed;
