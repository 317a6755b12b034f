use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::balance;
use crate::engine::costs;
use crate::engine_design::{EngineId, EngineStats, FuelType};
use crate::error::{CatalogError, FlawError};
use crate::flight_plan::{EventKind, EventRates, RiskEvent};
use crate::rocket_design::{DesignId, RocketDesign};
use crate::world_seed::WorldSeed;

pub type FlawId = u32;

/// Catalog shipped with the crate
const BUILTIN_CATALOG: &str = include_str!("../data/flaw_catalog.toml");

/// What a flaw is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlawScope {
    /// Applies to every event of the design's flights
    Design(DesignId),
    /// Applies only to events where this engine type is firing
    Engine(EngineId),
}

impl FlawScope {
    /// World-seed topic the flaws of this scope are rolled from
    pub fn topic(&self) -> String {
        match self {
            FlawScope::Design(id) => format!("flaws/design/{}", id),
            FlawScope::Engine(id) => format!("flaws/engine/{}", id),
        }
    }
}

/// Which launch event triggers a flaw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlawTrigger {
    /// Any ignition, on the pad or in space
    Ignition,
    Liftoff,
    MaxQ,
    /// Any separation event (stage or booster)
    Separation,
    OrbitInsertion,
    /// In-space burns only
    TransferBurn,
    Landing,
    PayloadRelease,
}

impl FlawTrigger {
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            FlawTrigger::Ignition => matches!(kind, EventKind::Ignition | EventKind::TransferBurn),
            FlawTrigger::Liftoff => kind == EventKind::Liftoff,
            FlawTrigger::MaxQ => kind == EventKind::MaxQ,
            FlawTrigger::Separation => {
                matches!(kind, EventKind::StageSeparation | EventKind::BoosterSeparation)
            }
            FlawTrigger::OrbitInsertion => kind == EventKind::OrbitInsertion,
            FlawTrigger::TransferBurn => kind == EventKind::TransferBurn,
            FlawTrigger::Landing => kind == EventKind::Landing,
            FlawTrigger::PayloadRelease => kind == EventKind::PayloadRelease,
        }
    }
}

/// Represents a hidden defect in a rocket that can cause failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flaw {
    pub id: FlawId,
    /// Catalog key the flaw was rolled from
    pub template_key: String,
    pub name: String,
    pub description: String,
    pub scope: FlawScope,
    pub trigger: FlawTrigger,
    /// Probability added to each matching event while unfixed
    pub failure_rate: f64,
    pub fix_cost: f64,
    /// Whether the flaw has been discovered (through a flight failure)
    pub discovered: bool,
    pub fixed: bool,
}

impl Flaw {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: FlawId,
        template_key: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        scope: FlawScope,
        trigger: FlawTrigger,
        failure_rate: f64,
        fix_cost: f64,
    ) -> Self {
        Self {
            id,
            template_key: template_key.into(),
            name: name.into(),
            description: description.into(),
            scope,
            trigger,
            failure_rate,
            fix_cost,
            discovered: false,
            fixed: false,
        }
    }

    fn from_template(template: &FlawTemplate, id: FlawId, scope: FlawScope) -> Self {
        Self::new(
            id,
            template.key.clone(),
            template.name.clone(),
            template.description.clone(),
            scope,
            template.trigger,
            template.failure_rate,
            template.fix_cost,
        )
    }

    /// Check if this flaw is active (not fixed) and should affect launches
    pub fn is_active(&self) -> bool {
        !self.fixed
    }

    /// Get the effective failure rate (0 if fixed)
    pub fn effective_failure_rate(&self) -> f64 {
        if self.fixed {
            0.0
        } else {
            self.failure_rate
        }
    }

    /// Whether this flaw can cause `event` to fail
    pub fn applies_to(&self, event: &RiskEvent) -> bool {
        if !self.is_active() || !self.trigger.matches(event.kind) {
            return false;
        }
        match self.scope {
            FlawScope::Design(_) => true,
            FlawScope::Engine(id) => event.engines.contains(&id),
        }
    }
}

// ==========================================
// Catalog
// ==========================================

/// One entry of the flaw catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlawTemplate {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: FlawTrigger,
    pub failure_rate: f64,
    #[serde(default = "default_fix_cost")]
    pub fix_cost: f64,
    /// Chance the flaw is rolled into a new engine or design, before scaling
    pub occurrence: f64,
    /// Engine templates only: restrict to these fuels (empty = any)
    #[serde(default)]
    pub fuels: Vec<FuelType>,
    /// Engine templates only: require a turbopump-fed cycle
    #[serde(default)]
    pub turbopump_only: bool,
    /// Design templates only
    #[serde(default)]
    pub min_core_stages: usize,
    #[serde(default)]
    pub requires_boosters: bool,
}

fn default_fix_cost() -> f64 {
    costs::FLAW_FIX_COST
}

impl FlawTemplate {
    fn fits_engine(&self, stats: &EngineStats) -> bool {
        (self.fuels.is_empty() || self.fuels.contains(&stats.fuel))
            && (!self.turbopump_only || stats.cycle.has_turbopump())
    }

    fn fits_design(&self, core_stages: usize, has_boosters: bool) -> bool {
        core_stages >= self.min_core_stages && (!self.requires_boosters || has_boosters)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidTemplate {
            key: self.key.clone(),
            reason,
        };
        if self.key.is_empty() {
            return Err(invalid("empty key".to_string()));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(invalid(format!("failure_rate {} outside [0, 1]", self.failure_rate)));
        }
        if !(0.0..=1.0).contains(&self.occurrence) {
            return Err(invalid(format!("occurrence {} outside [0, 1]", self.occurrence)));
        }
        if self.fix_cost < 0.0 || self.fix_cost.is_nan() {
            return Err(invalid(format!("fix_cost {} is negative", self.fix_cost)));
        }
        Ok(())
    }
}

/// Data-driven set of possible flaws, split by what they attach to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlawCatalog {
    #[serde(default)]
    pub engine: Vec<FlawTemplate>,
    #[serde(default)]
    pub design: Vec<FlawTemplate>,
}

impl FlawCatalog {
    /// The catalog bundled in `data/flaw_catalog.toml`
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: FlawCatalog = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&content)?;
        info!(path = %path.display(), templates = catalog.len(), "loaded flaw catalog");
        Ok(catalog)
    }

    /// Every template valid and every key unique across both tables
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut keys = HashSet::new();
        for template in self.engine.iter().chain(&self.design) {
            template.validate()?;
            if !keys.insert(template.key.as_str()) {
                return Err(CatalogError::InvalidTemplate {
                    key: template.key.clone(),
                    reason: "duplicate key".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.engine.len() + self.design.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Roll each template once; a template exists with probability occurrence × multiplier (capped at 1).
fn roll_templates<'a, R: Rng + ?Sized>(
    templates: impl Iterator<Item = &'a FlawTemplate>,
    multiplier: f64,
    rng: &mut R,
) -> Vec<&'a FlawTemplate> {
    templates
        .filter(|t| {
            let chance = (t.occurrence * multiplier).clamp(0.0, 1.0);
            rng.gen::<f64>() < chance
        })
        .collect()
}

// ==========================================
// Registry
// ==========================================

/// Result of a paid fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlawFix {
    pub id: FlawId,
    pub cost: f64,
}

/// Every flaw ever generated, with discovery and fix history.
/// Generation happens at most once per scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlawRegistry {
    flaws: Vec<Flaw>,
    next_id: FlawId,
    generated: BTreeSet<FlawScope>,
}

impl Default for FlawRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FlawRegistry {
    pub fn new() -> Self {
        Self {
            flaws: Vec::new(),
            next_id: 1,
            generated: BTreeSet::new(),
        }
    }

    pub fn is_generated(&self, scope: FlawScope) -> bool {
        self.generated.contains(&scope)
    }

    /// Roll engine flaws for `engine_id` the first time it is asked for.
    /// Returns the ids created by this call (empty if already generated).
    pub fn ensure_engine_flaws(
        &mut self,
        engine_id: EngineId,
        stats: &EngineStats,
        catalog: &FlawCatalog,
        seed: &WorldSeed,
    ) -> Vec<FlawId> {
        let scope = FlawScope::Engine(engine_id);
        if !self.generated.insert(scope) {
            return Vec::new();
        }
        let center = balance::complexity_range(stats.fuel).center;
        let multiplier = balance::engine_flaw_occurrence_multiplier(stats.complexity, center);
        let mut rng = seed.query_rng(&scope.topic());
        let rolled = roll_templates(catalog.engine.iter().filter(|t| t.fits_engine(stats)), multiplier, &mut rng);
        self.insert_all(&rolled, scope)
    }

    /// Roll design flaws for `design_id` the first time it is asked for.
    pub fn ensure_design_flaws(
        &mut self,
        design_id: DesignId,
        design: &RocketDesign,
        catalog: &FlawCatalog,
        seed: &WorldSeed,
    ) -> Vec<FlawId> {
        let scope = FlawScope::Design(design_id);
        if !self.generated.insert(scope) {
            return Vec::new();
        }
        let core_stages = design.core_stage_count();
        let has_boosters = design.has_boosters();
        let multiplier = balance::design_flaw_occurrence_multiplier(core_stages);
        let mut rng = seed.query_rng(&scope.topic());
        let rolled = roll_templates(
            catalog.design.iter().filter(|t| t.fits_design(core_stages, has_boosters)),
            multiplier,
            &mut rng,
        );
        self.insert_all(&rolled, scope)
    }

    fn insert_all(&mut self, templates: &[&FlawTemplate], scope: FlawScope) -> Vec<FlawId> {
        let ids: Vec<FlawId> = templates
            .iter()
            .map(|template| {
                let id = self.next_id;
                self.next_id += 1;
                self.flaws.push(Flaw::from_template(template, id, scope));
                id
            })
            .collect();
        debug!(scope = ?scope, count = ids.len(), "flaws generated");
        ids
    }

    pub fn get(&self, id: FlawId) -> Option<&Flaw> {
        self.flaws.iter().find(|f| f.id == id)
    }

    fn get_mut(&mut self, id: FlawId) -> Result<&mut Flaw, FlawError> {
        self.flaws
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(FlawError::UnknownFlaw(id))
    }

    pub fn all(&self) -> &[Flaw] {
        &self.flaws
    }

    pub fn list_flaws(&self, scope: FlawScope) -> Vec<&Flaw> {
        self.flaws.iter().filter(|f| f.scope == scope).collect()
    }

    /// Known to the player but not yet fixed
    pub fn discovered_flaws(&self) -> Vec<&Flaw> {
        self.flaws.iter().filter(|f| f.discovered && !f.fixed).collect()
    }

    pub fn fixed_flaws(&self) -> Vec<&Flaw> {
        self.flaws.iter().filter(|f| f.fixed).collect()
    }

    /// Every flaw bound to a design or any of its engines, fixed ones included
    pub fn flaws_for(&self, design_id: DesignId, engines: &BTreeSet<EngineId>) -> Vec<Flaw> {
        self.flaws
            .iter()
            .filter(|f| match f.scope {
                FlawScope::Design(id) => id == design_id,
                FlawScope::Engine(id) => engines.contains(&id),
            })
            .cloned()
            .collect()
    }

    /// Unfixed flaws bound to a design or any of its engines
    pub fn active_flaws_for(&self, design_id: DesignId, engines: &BTreeSet<EngineId>) -> Vec<Flaw> {
        let mut flaws = self.flaws_for(design_id, engines);
        flaws.retain(|f| f.is_active());
        flaws
    }

    /// Returns true if the flaw was not already known
    pub fn mark_discovered(&mut self, id: FlawId) -> Result<bool, FlawError> {
        let flaw = self.get_mut(id)?;
        if flaw.discovered {
            return Ok(false);
        }
        flaw.discovered = true;
        info!(flaw = id, name = %flaw.name, "flaw discovered");
        Ok(true)
    }

    /// Pay to fix a discovered flaw. `available_funds` is checked, never debited here.
    pub fn fix_flaw(&mut self, id: FlawId, available_funds: f64) -> Result<FlawFix, FlawError> {
        let flaw = self.get_mut(id)?;
        if flaw.fixed {
            return Err(FlawError::AlreadyFixed(id));
        }
        if !flaw.discovered {
            return Err(FlawError::NotDiscovered(id));
        }
        if flaw.fix_cost > available_funds {
            return Err(FlawError::InsufficientFunds {
                needed: flaw.fix_cost,
                available: available_funds,
            });
        }
        flaw.fixed = true;
        info!(flaw = id, name = %flaw.name, cost = flaw.fix_cost, "flaw fixed");
        Ok(FlawFix {
            id,
            cost: flaw.fix_cost,
        })
    }

    pub fn unknown_flaw_count(&self, scope: FlawScope) -> usize {
        self.flaws
            .iter()
            .filter(|f| f.scope == scope && !f.discovered && !f.fixed)
            .count()
    }

    /// Fuzzy range guaranteed to contain the number of undiscovered flaws
    pub fn estimate_unknown_flaw_count(&self, scope: FlawScope) -> (usize, usize) {
        let unknown = self.unknown_flaw_count(scope);
        (unknown.saturating_sub(2), unknown + 2)
    }
}

// ==========================================
// Failure attribution
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCause {
    Flaw(FlawId),
    /// Bad luck: the inherent event risk
    Unknown,
}

/// Pick a contributor with probability proportional to its rate. `roll` is in [0, 1).
pub fn pick_weighted(contributors: &[(FlawId, f64)], roll: f64) -> Option<FlawId> {
    let total: f64 = contributors.iter().map(|(_, rate)| rate).sum();
    if total <= 0.0 {
        return None;
    }
    let target = roll * total;
    let mut cumulative = 0.0;
    for (id, rate) in contributors {
        cumulative += rate;
        if target < cumulative {
            return Some(*id);
        }
    }
    // Float rounding at the top end
    contributors.last().map(|(id, _)| *id)
}

/// Decide what caused a failure, given the two attribution rolls.
pub fn attribute_failure(
    contributors: &[(FlawId, f64)],
    rates: &EventRates,
    cause_roll: f64,
    pick_roll: f64,
) -> FailureCause {
    if rates.flaw <= 0.0 || rates.base + rates.flaw <= 0.0 {
        return FailureCause::Unknown;
    }
    if cause_roll >= rates.flaw_share() {
        return FailureCause::Unknown;
    }
    pick_weighted(contributors, pick_roll).map_or(FailureCause::Unknown, FailureCause::Flaw)
}

/// Draw the attribution rolls from `rng`, skipping any roll that cannot matter.
pub fn roll_failure_cause<R: Rng + ?Sized>(
    contributors: &[(FlawId, f64)],
    rates: &EventRates,
    rng: &mut R,
) -> FailureCause {
    if contributors.is_empty() || rates.flaw <= 0.0 || rates.base + rates.flaw <= 0.0 {
        return FailureCause::Unknown;
    }
    let cause_roll: f64 = rng.gen();
    if cause_roll >= rates.flaw_share() {
        return FailureCause::Unknown;
    }
    let pick_roll: f64 = rng.gen();
    attribute_failure(contributors, rates, cause_roll, pick_roll)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_design::{EngineCycle, EngineDesign};
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn separation_event(engines: Vec<EngineId>) -> RiskEvent {
        RiskEvent {
            name: "Stage 1 Separation".to_string(),
            description: String::new(),
            kind: EventKind::StageSeparation,
            rocket_stage: 0,
            engines,
            base_rate: 0.05,
        }
    }

    /// An rng whose every f64 draw is `value`
    fn fixed_roll(value: f64) -> StepRng {
        let bits = (value * (1u64 << 53) as f64) as u64;
        StepRng::new(bits << 11, 0)
    }

    fn always_catalog() -> FlawCatalog {
        FlawCatalog::from_toml_str(
            r#"
            [[engine]]
            key = "pump"
            name = "Pump"
            trigger = "ignition"
            failure_rate = 0.1
            fix_cost = 1000.0
            occurrence = 1.0
            turbopump_only = true

            [[engine]]
            key = "grain"
            name = "Grain"
            trigger = "ignition"
            failure_rate = 0.1
            fix_cost = 1000.0
            occurrence = 1.0
            fuels = ["solid"]

            [[design]]
            key = "bolts"
            name = "Bolts"
            trigger = "separation"
            failure_rate = 0.1
            fix_cost = 1000.0
            occurrence = 1.0
            min_core_stages = 2

            [[design]]
            key = "struts"
            name = "Struts"
            trigger = "separation"
            failure_rate = 0.1
            fix_cost = 1000.0
            occurrence = 1.0
            requires_boosters = true

            [[design]]
            key = "clamp"
            name = "Clamp"
            trigger = "liftoff"
            failure_rate = 0.05
            fix_cost = 500.0
            occurrence = 1.0

            [[design]]
            key = "never"
            name = "Never"
            trigger = "liftoff"
            failure_rate = 0.05
            fix_cost = 500.0
            occurrence = 0.0
            "#,
        )
        .unwrap()
    }

    fn single_stage_design() -> RocketDesign {
        let mut design = RocketDesign::new("One");
        design
            .add_stage(EngineDesign::with_defaults(FuelType::Kerolox).snapshot(0))
            .unwrap();
        design
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = FlawCatalog::builtin().unwrap();
        assert!(catalog.engine.len() >= 7);
        assert!(catalog.design.len() >= 10);
        let resonance = catalog.design.iter().find(|t| t.key == "structural_resonance").unwrap();
        assert_eq!(resonance.trigger, FlawTrigger::MaxQ);
        assert_eq!(resonance.failure_rate, 0.15);
    }

    #[test]
    fn test_missing_fix_cost_uses_default() {
        let catalog = FlawCatalog::from_toml_str(
            r#"
            [[design]]
            key = "fairing"
            name = "Fairing Latch"
            trigger = "payload_release"
            failure_rate = 0.05
            occurrence = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(catalog.design[0].fix_cost, costs::FLAW_FIX_COST);

        let mut registry = FlawRegistry::new();
        let catalog = FlawCatalog {
            design: vec![FlawTemplate {
                occurrence: 1.0,
                ..catalog.design[0].clone()
            }],
            ..FlawCatalog::default()
        };
        let ids = registry.ensure_design_flaws(0, &single_stage_design(), &catalog, &WorldSeed::new(1));
        assert_eq!(registry.get(ids[0]).unwrap().fix_cost, costs::FLAW_FIX_COST);
    }

    #[test]
    fn test_catalog_validation() {
        let bad_rate = r#"
            [[design]]
            key = "x"
            name = "X"
            trigger = "liftoff"
            failure_rate = 1.5
            fix_cost = 0.0
            occurrence = 0.5
        "#;
        assert!(matches!(
            FlawCatalog::from_toml_str(bad_rate),
            Err(CatalogError::InvalidTemplate { key, .. }) if key == "x"
        ));

        let duplicate = r#"
            [[engine]]
            key = "x"
            name = "X"
            trigger = "ignition"
            failure_rate = 0.1
            fix_cost = 0.0
            occurrence = 0.5

            [[design]]
            key = "x"
            name = "X again"
            trigger = "liftoff"
            failure_rate = 0.1
            fix_cost = 0.0
            occurrence = 0.5
        "#;
        assert!(FlawCatalog::from_toml_str(duplicate).is_err());

        let bad_trigger = r#"
            [[design]]
            key = "x"
            name = "X"
            trigger = "reentry"
            failure_rate = 0.1
            fix_cost = 0.0
            occurrence = 0.5
        "#;
        assert!(matches!(FlawCatalog::from_toml_str(bad_trigger), Err(CatalogError::Toml(_))));
    }

    #[test]
    fn test_trigger_matching() {
        assert!(FlawTrigger::Separation.matches(EventKind::StageSeparation));
        assert!(FlawTrigger::Separation.matches(EventKind::BoosterSeparation));
        assert!(FlawTrigger::Ignition.matches(EventKind::TransferBurn));
        assert!(!FlawTrigger::TransferBurn.matches(EventKind::Ignition));
        assert!(!FlawTrigger::MaxQ.matches(EventKind::Liftoff));
    }

    #[test]
    fn test_engine_flaw_applies_only_to_its_engine() {
        let flaw = Flaw::new(1, "k", "F", "", FlawScope::Engine(3), FlawTrigger::Separation, 0.1, 0.0);
        assert!(flaw.applies_to(&separation_event(vec![3])));
        assert!(!flaw.applies_to(&separation_event(vec![4])));

        let design_flaw = Flaw::new(2, "k", "F", "", FlawScope::Design(0), FlawTrigger::Separation, 0.1, 0.0);
        assert!(design_flaw.applies_to(&separation_event(vec![4])));
    }

    #[test]
    fn test_fixed_flaw_has_no_effect() {
        let mut flaw = Flaw::new(1, "k", "F", "", FlawScope::Design(0), FlawTrigger::Separation, 0.1, 0.0);
        flaw.fixed = true;
        assert_eq!(flaw.effective_failure_rate(), 0.0);
        assert!(!flaw.applies_to(&separation_event(vec![])));
    }

    #[test]
    fn test_engine_generation_respects_filters() {
        let catalog = always_catalog();
        let seed = WorldSeed::new(1);
        let mut registry = FlawRegistry::new();

        let kerolox = EngineDesign::with_defaults(FuelType::Kerolox).stats();
        let ids = registry.ensure_engine_flaws(0, &kerolox, &catalog, &seed);
        let keys: Vec<&str> = ids.iter().map(|id| registry.get(*id).unwrap().template_key.as_str()).collect();
        assert_eq!(keys, vec!["pump"]);

        let solid = EngineDesign::with_defaults(FuelType::Solid).stats();
        let ids = registry.ensure_engine_flaws(1, &solid, &catalog, &seed);
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.get(ids[0]).unwrap().template_key, "grain");

        // Pressure-fed hypergolic has no turbopump
        let hypergolic =
            EngineDesign::new("H", FuelType::Hypergolic, EngineCycle::PressureFed, 1.0).unwrap().stats();
        assert!(registry.ensure_engine_flaws(2, &hypergolic, &catalog, &seed).is_empty());
        assert!(registry.is_generated(FlawScope::Engine(2)));
    }

    #[test]
    fn test_design_generation_respects_filters() {
        let catalog = always_catalog();
        let seed = WorldSeed::new(1);
        let mut registry = FlawRegistry::new();
        registry.ensure_design_flaws(0, &single_stage_design(), &catalog, &seed);
        let keys: Vec<&str> = registry
            .list_flaws(FlawScope::Design(0))
            .iter()
            .map(|f| f.template_key.as_str())
            .collect();
        assert_eq!(keys, vec!["clamp"]);
    }

    #[test]
    fn test_generation_is_idempotent() {
        let catalog = FlawCatalog::builtin().unwrap();
        let seed = WorldSeed::new(99);
        let design = single_stage_design();
        let mut registry = FlawRegistry::new();
        let first = registry.ensure_design_flaws(0, &design, &catalog, &seed);
        let count = registry.all().len();
        let second = registry.ensure_design_flaws(0, &design, &catalog, &seed);
        assert!(second.is_empty());
        assert_eq!(registry.all().len(), count);
        assert_eq!(first.len(), count);
    }

    #[test]
    fn test_generation_is_deterministic_per_seed() {
        let catalog = FlawCatalog::builtin().unwrap();
        let stats = EngineDesign::with_defaults(FuelType::Methalox).stats();
        let keys = |seed: u64| {
            let mut registry = FlawRegistry::new();
            registry.ensure_engine_flaws(5, &stats, &catalog, &WorldSeed::new(seed));
            registry.all().iter().map(|f| f.template_key.clone()).collect::<Vec<_>>()
        };
        assert_eq!(keys(11), keys(11));
    }

    #[test]
    fn test_ids_increase() {
        let catalog = always_catalog();
        let seed = WorldSeed::new(3);
        let mut registry = FlawRegistry::new();
        let stats = EngineDesign::with_defaults(FuelType::Kerolox).stats();
        let a = registry.ensure_engine_flaws(0, &stats, &catalog, &seed);
        let b = registry.ensure_design_flaws(0, &single_stage_design(), &catalog, &seed);
        assert_eq!(a, vec![1]);
        assert_eq!(b, vec![2]);
    }

    #[test]
    fn test_fix_flaw_lifecycle() {
        let catalog = always_catalog();
        let mut registry = FlawRegistry::new();
        let ids = registry.ensure_design_flaws(0, &single_stage_design(), &catalog, &WorldSeed::new(1));
        let id = ids[0];

        assert_eq!(registry.fix_flaw(id, 1e9), Err(FlawError::NotDiscovered(id)));
        assert_eq!(registry.mark_discovered(id), Ok(true));
        assert_eq!(registry.mark_discovered(id), Ok(false));
        assert_eq!(registry.discovered_flaws().len(), 1);

        assert_eq!(
            registry.fix_flaw(id, 100.0),
            Err(FlawError::InsufficientFunds {
                needed: 500.0,
                available: 100.0
            })
        );
        assert_eq!(registry.fix_flaw(id, 500.0), Ok(FlawFix { id, cost: 500.0 }));
        assert_eq!(registry.fix_flaw(id, 500.0), Err(FlawError::AlreadyFixed(id)));

        // Record kept for history
        assert_eq!(registry.fixed_flaws().len(), 1);
        assert!(registry.discovered_flaws().is_empty());
        assert_eq!(registry.get(id).unwrap().effective_failure_rate(), 0.0);
        assert_eq!(registry.fix_flaw(999, 1e9), Err(FlawError::UnknownFlaw(999)));
        assert_eq!(registry.mark_discovered(999), Err(FlawError::UnknownFlaw(999)));
    }

    #[test]
    fn test_flaws_for_vehicle() {
        let catalog = always_catalog();
        let seed = WorldSeed::new(1);
        let mut registry = FlawRegistry::new();
        let kerolox = EngineDesign::with_defaults(FuelType::Kerolox).stats();
        registry.ensure_engine_flaws(0, &kerolox, &catalog, &seed);
        registry.ensure_engine_flaws(1, &kerolox, &catalog, &seed);
        registry.ensure_design_flaws(0, &single_stage_design(), &catalog, &seed);
        registry.ensure_design_flaws(1, &single_stage_design(), &catalog, &seed);

        let engines: BTreeSet<EngineId> = [0].into_iter().collect();
        let relevant = registry.flaws_for(0, &engines);
        assert_eq!(relevant.len(), 2);
        assert!(relevant.iter().all(|f| matches!(f.scope, FlawScope::Engine(0) | FlawScope::Design(0))));

        let id = relevant[0].id;
        registry.mark_discovered(id).unwrap();
        registry.fix_flaw(id, 1e9).unwrap();
        assert_eq!(registry.active_flaws_for(0, &engines).len(), 1);
        assert_eq!(registry.flaws_for(0, &engines).len(), 2);
    }

    #[test]
    fn test_unknown_flaw_estimate_brackets_truth() {
        let catalog = FlawCatalog::builtin().unwrap();
        let mut registry = FlawRegistry::new();
        let mut design = single_stage_design();
        design
            .add_stage(EngineDesign::with_defaults(FuelType::Hydrolox).snapshot(1))
            .unwrap();
        registry.ensure_design_flaws(0, &design, &catalog, &WorldSeed::new(4));
        let scope = FlawScope::Design(0);
        let truth = registry.unknown_flaw_count(scope);
        let (min, max) = registry.estimate_unknown_flaw_count(scope);
        assert!(min <= truth && truth <= max);
        assert_eq!(max - truth, 2);
    }

    #[test]
    fn test_pick_weighted() {
        let contributors = vec![(1, 0.10), (2, 0.30)];
        assert_eq!(pick_weighted(&contributors, 0.0), Some(1));
        assert_eq!(pick_weighted(&contributors, 0.24), Some(1));
        assert_eq!(pick_weighted(&contributors, 0.26), Some(2));
        assert_eq!(pick_weighted(&contributors, 0.999_999), Some(2));
        assert_eq!(pick_weighted(&[], 0.5), None);
    }

    #[test]
    fn test_attribution_threshold() {
        let contributors = vec![(7, 0.10)];
        let rates = EventRates { base: 0.05, flaw: 0.10 };
        // Share is 2/3
        assert_eq!(attribute_failure(&contributors, &rates, 0.66, 0.5), FailureCause::Flaw(7));
        assert_eq!(attribute_failure(&contributors, &rates, 0.67, 0.5), FailureCause::Unknown);
        assert_eq!(roll_failure_cause(&contributors, &rates, &mut fixed_roll(0.66)), FailureCause::Flaw(7));
        assert_eq!(roll_failure_cause(&contributors, &rates, &mut fixed_roll(0.67)), FailureCause::Unknown);
    }

    #[test]
    fn test_attribution_skips_rolls_without_flaws() {
        let rates = EventRates { base: 0.05, flaw: 0.0 };
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut untouched = rng.clone();
        assert_eq!(roll_failure_cause(&[], &rates, &mut rng), FailureCause::Unknown);
        assert_eq!(rng.gen::<u64>(), untouched.gen::<u64>());

        let zero = EventRates::default();
        assert_eq!(attribute_failure(&[(1, 0.0)], &zero, 0.0, 0.0), FailureCause::Unknown);
    }

    #[test]
    fn test_attribution_frequency_matches_flaw_share() {
        let contributors = vec![(7, 0.10)];
        let rates = EventRates { base: 0.05, flaw: 0.10 };
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let trials = 100_000;
        let attributed = (0..trials)
            .filter(|_| roll_failure_cause(&contributors, &rates, &mut rng) == FailureCause::Flaw(7))
            .count();
        let observed = attributed as f64 / trials as f64;
        assert!((observed - 0.10 / 0.15).abs() < 0.01, "observed {observed}");
    }
}
