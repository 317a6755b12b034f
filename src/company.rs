use std::collections::BTreeMap;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::engine_design::{EngineCycle, EngineDesign, EngineId, EngineStats, FuelType};
use crate::error::{ConfigError, CoreError, SimulationError, ValidationError};
use crate::flaw::{Flaw, FlawCatalog, FlawFix, FlawId, FlawRegistry, FlawScope};
use crate::flight_plan::TestingLevels;
use crate::launcher::{EventOutcome, LaunchSimulation, LaunchSnapshot, LaunchStatus, SimulationId};
use crate::mission_plan::MissionPlan;
use crate::rocket_design::{DesignId, RocketDesign};
use crate::world_seed::WorldSeed;

/// Everything one company owns: engine and rocket designs, the flaws rolled
/// into them, and launches in flight.
///
/// Ids are indices into the owning vectors and stay valid for the company's
/// lifetime. Flaw generation reads only the world seed; launch outcomes read
/// only the per-simulation seed.
#[derive(Debug, Clone)]
pub struct Company {
    world_seed: WorldSeed,
    catalog: FlawCatalog,
    starting_budget: f64,
    engines: Vec<EngineDesign>,
    designs: Vec<RocketDesign>,
    flaws: FlawRegistry,
    simulations: BTreeMap<SimulationId, LaunchSimulation>,
    next_simulation_id: SimulationId,
}

impl Company {
    pub fn new(config: &CoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let catalog = config.flaw_catalog()?;
        Ok(Self::with_catalog(config.world_seed(), catalog, config.starting_budget)?)
    }

    /// Budget must be finite and non-negative; every design starts with it.
    pub fn with_catalog(
        world_seed: WorldSeed,
        catalog: FlawCatalog,
        starting_budget: f64,
    ) -> Result<Self, ValidationError> {
        if starting_budget < 0.0 || !starting_budget.is_finite() {
            return Err(ValidationError::NegativeValue {
                field: "starting_budget",
                value: starting_budget,
            });
        }
        info!(
            seed = world_seed.raw_seed(),
            templates = catalog.len(),
            "company created"
        );
        Ok(Self {
            world_seed,
            catalog,
            starting_budget,
            engines: Vec::new(),
            designs: Vec::new(),
            flaws: FlawRegistry::new(),
            simulations: BTreeMap::new(),
            next_simulation_id: 1,
        })
    }

    pub fn world_seed(&self) -> WorldSeed {
        self.world_seed
    }

    pub fn catalog(&self) -> &FlawCatalog {
        &self.catalog
    }

    // ==========================================
    // Engines
    // ==========================================

    pub fn create_engine(
        &mut self,
        fuel: FuelType,
        cycle: EngineCycle,
        scale: f64,
    ) -> Result<EngineId, CoreError> {
        let id = self.engines.len();
        let name = format!("{} {}", fuel.display_name(), id + 1);
        let engine = EngineDesign::new(name, fuel, cycle, scale)?;
        debug!(engine = id, %fuel, %cycle, scale, "engine created");
        self.engines.push(engine);
        Ok(id)
    }

    pub fn engine(&self, id: EngineId) -> Result<&EngineDesign, CoreError> {
        self.engines.get(id).ok_or(CoreError::UnknownEngine(id))
    }

    fn engine_mut(&mut self, id: EngineId) -> Result<&mut EngineDesign, CoreError> {
        self.engines.get_mut(id).ok_or(CoreError::UnknownEngine(id))
    }

    pub fn engine_stats(&self, id: EngineId) -> Result<EngineStats, CoreError> {
        Ok(self.engine(id)?.stats())
    }

    pub fn engines(&self) -> &[EngineDesign] {
        &self.engines
    }

    /// Change fuel, resetting an incompatible cycle. Returns the cycle now in effect.
    pub fn set_engine_fuel(&mut self, id: EngineId, fuel: FuelType) -> Result<EngineCycle, CoreError> {
        let cycle = self.engine_mut(id)?.set_fuel(fuel);
        self.refresh_stages(id);
        Ok(cycle)
    }

    pub fn set_engine_cycle(&mut self, id: EngineId, cycle: EngineCycle) -> Result<(), CoreError> {
        self.engine_mut(id)?.set_cycle(cycle)?;
        self.refresh_stages(id);
        Ok(())
    }

    pub fn set_engine_scale(&mut self, id: EngineId, scale: f64) -> Result<(), CoreError> {
        self.engine_mut(id)?.set_scale(scale)?;
        self.refresh_stages(id);
        Ok(())
    }

    /// Push the engine's current stats into every stage that uses it
    fn refresh_stages(&mut self, id: EngineId) {
        let Some(engine) = self.engines.get(id) else {
            return;
        };
        let snapshot = engine.snapshot(id);
        let refreshed: usize = self
            .designs
            .iter_mut()
            .map(|design| design.refresh_engine(&snapshot))
            .sum();
        if refreshed > 0 {
            debug!(engine = id, stages = refreshed, "stage snapshots refreshed");
        }
    }

    // ==========================================
    // Rocket designs
    // ==========================================

    pub fn create_design(&mut self, name: impl Into<String>) -> DesignId {
        let id = self.designs.len();
        let design = RocketDesign::with_starting_budget(name, self.starting_budget);
        debug!(design = id, name = %design.name, "design created");
        self.designs.push(design);
        id
    }

    pub fn design(&self, id: DesignId) -> Result<&RocketDesign, CoreError> {
        self.designs.get(id).ok_or(CoreError::UnknownDesign(id))
    }

    fn design_mut(&mut self, id: DesignId) -> Result<&mut RocketDesign, CoreError> {
        self.designs.get_mut(id).ok_or(CoreError::UnknownDesign(id))
    }

    pub fn designs(&self) -> &[RocketDesign] {
        &self.designs
    }

    /// Append a one-engine stage using `engine`. Returns the new stage index.
    pub fn add_stage(&mut self, design: DesignId, engine: EngineId) -> Result<usize, CoreError> {
        let snapshot = self.engine(engine)?.snapshot(engine);
        Ok(self.design_mut(design)?.add_stage(snapshot)?)
    }

    pub fn remove_stage(&mut self, design: DesignId, index: usize) -> Result<(), CoreError> {
        self.design_mut(design)?.remove_stage(index)?;
        Ok(())
    }

    pub fn move_stage(&mut self, design: DesignId, from: usize, to: usize) -> Result<(), CoreError> {
        Ok(self.design_mut(design)?.move_stage(from, to)?)
    }

    pub fn set_stage_engine_count(
        &mut self,
        design: DesignId,
        index: usize,
        count: u32,
    ) -> Result<(), CoreError> {
        Ok(self.design_mut(design)?.set_stage_engine_count(index, count)?)
    }

    pub fn set_stage_mass_fraction(
        &mut self,
        design: DesignId,
        index: usize,
        fraction: f64,
    ) -> Result<(), CoreError> {
        Ok(self.design_mut(design)?.set_stage_mass_fraction(index, fraction)?)
    }

    pub fn set_stage_booster(
        &mut self,
        design: DesignId,
        index: usize,
        is_booster: bool,
    ) -> Result<(), CoreError> {
        Ok(self.design_mut(design)?.set_stage_booster(index, is_booster)?)
    }

    pub fn set_payload_mass(&mut self, design: DesignId, mass_kg: f64) -> Result<(), CoreError> {
        Ok(self.design_mut(design)?.set_payload_mass(mass_kg)?)
    }

    pub fn set_target_delta_v(&mut self, design: DesignId, delta_v: f64) -> Result<(), CoreError> {
        Ok(self.design_mut(design)?.set_target_delta_v(delta_v)?)
    }

    pub fn total_effective_delta_v(&self, design: DesignId) -> Result<f64, CoreError> {
        Ok(self.design(design)?.total_effective_delta_v())
    }

    pub fn total_cost(&self, design: DesignId) -> Result<f64, CoreError> {
        Ok(self.design(design)?.total_cost())
    }

    pub fn is_launchable(&self, design: DesignId) -> Result<bool, CoreError> {
        Ok(self.design(design)?.is_launchable())
    }

    /// Closed-form success chance using the flaws generated so far.
    /// Never generates flaws itself; call [`Self::ensure_design_flaws`] first
    /// for a figure that matches what a launch would fly with.
    pub fn mission_success_probability(
        &self,
        design: DesignId,
        plan: &MissionPlan,
        testing: &TestingLevels,
    ) -> Result<f64, CoreError> {
        let rocket = self.design(design)?;
        let flaws = self.flaws.flaws_for(design, &rocket.engine_ids());
        Ok(rocket.mission_success_probability(&flaws, plan, testing))
    }

    // ==========================================
    // Flaws
    // ==========================================

    /// Roll the flaws for `scope` if that has not happened yet.
    /// Returns the ids created by this call.
    pub fn ensure_flaws_generated(&mut self, scope: FlawScope) -> Result<Vec<FlawId>, CoreError> {
        match scope {
            FlawScope::Engine(id) => {
                let stats = self.engine_stats(id)?;
                Ok(self
                    .flaws
                    .ensure_engine_flaws(id, &stats, &self.catalog, &self.world_seed))
            }
            FlawScope::Design(id) => {
                let design = self.designs.get(id).ok_or(CoreError::UnknownDesign(id))?;
                Ok(self
                    .flaws
                    .ensure_design_flaws(id, design, &self.catalog, &self.world_seed))
            }
        }
    }

    /// Generate flaws for a design and every engine type it flies
    pub fn ensure_design_flaws(&mut self, design: DesignId) -> Result<Vec<FlawId>, CoreError> {
        let engines = self.design(design)?.engine_ids();
        let mut created = self.ensure_flaws_generated(FlawScope::Design(design))?;
        for engine in engines {
            created.extend(self.ensure_flaws_generated(FlawScope::Engine(engine))?);
        }
        Ok(created)
    }

    pub fn list_flaws(&self, scope: FlawScope) -> Vec<&Flaw> {
        self.flaws.list_flaws(scope)
    }

    /// Fix a discovered flaw if `funds` cover it. Debiting is the caller's job.
    pub fn fix_flaw(&mut self, id: FlawId, funds: f64) -> Result<FlawFix, CoreError> {
        Ok(self.flaws.fix_flaw(id, funds)?)
    }

    pub fn flaw_registry(&self) -> &FlawRegistry {
        &self.flaws
    }

    /// Replace flaw state with a previously saved registry
    pub fn restore_flaws(&mut self, registry: FlawRegistry) {
        info!(flaws = registry.all().len(), "flaw registry restored");
        self.flaws = registry;
    }

    // ==========================================
    // Launches
    // ==========================================

    /// Start a launch with a fresh random seed
    pub fn start_simulation(
        &mut self,
        design: DesignId,
        plan: &MissionPlan,
        testing: &TestingLevels,
    ) -> Result<SimulationId, CoreError> {
        let seed = rand::thread_rng().gen();
        self.start_simulation_with_seed(design, plan, testing, seed)
    }

    /// Start a reproducible launch. Flaws are generated first if needed, then the
    /// design, its flaws and the event profile are frozen into the simulation.
    pub fn start_simulation_with_seed(
        &mut self,
        design: DesignId,
        plan: &MissionPlan,
        testing: &TestingLevels,
        seed: u64,
    ) -> Result<SimulationId, CoreError> {
        self.ensure_design_flaws(design)?;
        let rocket = self.design(design)?;
        if !rocket.is_launchable() {
            debug!(design, "launching a design that is not launchable");
        }
        let flaws = self.flaws.flaws_for(design, &rocket.engine_ids());
        let snapshot = LaunchSnapshot::capture(design, rocket, flaws, plan, testing)?;

        let id = self.next_simulation_id;
        self.next_simulation_id += 1;
        self.simulations
            .insert(id, LaunchSimulation::new(id, snapshot, seed));
        Ok(id)
    }

    pub fn simulation(&self, id: SimulationId) -> Result<&LaunchSimulation, CoreError> {
        self.simulations
            .get(&id)
            .ok_or(CoreError::Simulation(SimulationError::UnknownSimulation(id)))
    }

    fn simulation_mut(&mut self, id: SimulationId) -> Result<&mut LaunchSimulation, CoreError> {
        self.simulations
            .get_mut(&id)
            .ok_or(CoreError::Simulation(SimulationError::UnknownSimulation(id)))
    }

    /// Evaluate the next event. A flaw blamed for a failure becomes discovered
    /// in the company's registry as well as in the simulation.
    pub fn step_event(&mut self, id: SimulationId) -> Result<EventOutcome, CoreError> {
        let outcome = self.simulation_mut(id)?.step()?;
        if let Some(flaw_id) = outcome.discovered_flaw_id {
            if let Err(err) = self.flaws.mark_discovered(flaw_id) {
                warn!(simulation = id, flaw = flaw_id, %err, "discovered flaw missing from registry");
            }
        }
        Ok(outcome)
    }

    /// Step until the launch ends
    pub fn run_simulation(&mut self, id: SimulationId) -> Result<LaunchStatus, CoreError> {
        while !self.simulation(id)?.is_complete() {
            self.step_event(id)?;
        }
        self.is_complete(id)
    }

    /// Final status once the launch is over, else the in-flight status
    pub fn is_complete(&self, id: SimulationId) -> Result<LaunchStatus, CoreError> {
        Ok(self.simulation(id)?.status())
    }

    pub fn simulations(&self) -> impl Iterator<Item = &LaunchSimulation> {
        self.simulations.values()
    }

    pub fn discard_simulation(&mut self, id: SimulationId) -> Result<LaunchSimulation, CoreError> {
        self.simulations
            .remove(&id)
            .ok_or(CoreError::Simulation(SimulationError::UnknownSimulation(id)))
    }
}
