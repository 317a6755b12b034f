use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::balance;
use crate::engine::costs;
use crate::engine_design::{EngineId, EngineSnapshot};
use crate::error::ValidationError;
use crate::flaw::Flaw;
use crate::flight_plan::{self, TestingLevels};
use crate::mission_plan::MissionPlan;
use crate::stage::RocketStage;

pub type DesignId = usize;

/// Mission constants for LEO insertion
/// Note: This is the EFFECTIVE delta-v needed, accounting for gravity and drag losses
pub const TARGET_DELTA_V_MS: f64 = 8100.0; // ~7800 orbital velocity + ~300 aerodynamic losses
pub const DEFAULT_PAYLOAD_KG: f64 = 8000.0;

/// A core stage and the booster (if any) that fires alongside it.
/// Boosters at index i are attached to the stage at index i-1 (the core)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoosterGroup {
    /// Index of the core stage (the stage boosters are attached to)
    pub core_stage_index: usize,
    pub booster_index: Option<usize>,
}

impl BoosterGroup {
    /// Stage indices that ignite together, core first
    pub fn stage_indices(&self) -> impl Iterator<Item = usize> {
        std::iter::once(self.core_stage_index).chain(self.booster_index)
    }
}

/// Delta-v bookkeeping for one firing group
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BurnPerformance {
    pub ideal_delta_v: f64,
    pub gravity_loss: f64,
    pub effective_delta_v: f64,
    /// Combined TWR at ignition of the group
    pub initial_twr: f64,
}

/// An ordered stack of stages (index 0 fires first) plus the payload it must deliver.
/// Every aggregate is recomputed from the stages on each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocketDesign {
    pub name: String,
    stages: Vec<RocketStage>,
    payload_mass_kg: f64,
    target_delta_v: f64,
    starting_budget: f64,
}

impl Default for RocketDesign {
    fn default() -> Self {
        Self::new("New Rocket")
    }
}

impl RocketDesign {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            payload_mass_kg: DEFAULT_PAYLOAD_KG,
            target_delta_v: TARGET_DELTA_V_MS,
            starting_budget: costs::STARTING_BUDGET,
        }
    }

    /// New design funded with a budget the caller has already validated
    pub(crate) fn with_starting_budget(name: impl Into<String>, starting_budget: f64) -> Self {
        Self {
            starting_budget,
            ..Self::new(name)
        }
    }

    pub fn stages(&self) -> &[RocketStage] {
        &self.stages
    }

    pub fn stage(&self, index: usize) -> Result<&RocketStage, ValidationError> {
        self.stages.get(index).ok_or(ValidationError::StageIndexOutOfRange {
            index,
            len: self.stages.len(),
        })
    }

    fn stage_mut(&mut self, index: usize) -> Result<&mut RocketStage, ValidationError> {
        let len = self.stages.len();
        self.stages
            .get_mut(index)
            .ok_or(ValidationError::StageIndexOutOfRange { index, len })
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn payload_mass_kg(&self) -> f64 {
        self.payload_mass_kg
    }

    pub fn set_payload_mass(&mut self, mass_kg: f64) -> Result<(), ValidationError> {
        self.payload_mass_kg = non_negative("payload_mass_kg", mass_kg)?;
        Ok(())
    }

    pub fn target_delta_v(&self) -> f64 {
        self.target_delta_v
    }

    /// Set the target delta-v for this mission
    pub fn set_target_delta_v(&mut self, delta_v: f64) -> Result<(), ValidationError> {
        self.target_delta_v = non_negative("target_delta_v", delta_v)?;
        Ok(())
    }

    pub fn starting_budget(&self) -> f64 {
        self.starting_budget
    }

    pub fn set_starting_budget(&mut self, budget: f64) -> Result<(), ValidationError> {
        self.starting_budget = non_negative("starting_budget", budget)?;
        Ok(())
    }

    // ==========================================
    // Stage Management
    // ==========================================

    /// Add a new single-engine stage to the top of the rocket
    pub fn add_stage(&mut self, snapshot: EngineSnapshot) -> Result<usize, ValidationError> {
        self.add_stage_with_count(snapshot, 1)
    }

    pub fn add_stage_with_count(
        &mut self,
        snapshot: EngineSnapshot,
        engine_count: u32,
    ) -> Result<usize, ValidationError> {
        let stage = RocketStage::new(snapshot, engine_count)?;
        self.stages.push(stage);
        Ok(self.stages.len() - 1)
    }

    /// Remove a stage by index. Boosters left without a core are demoted.
    pub fn remove_stage(&mut self, index: usize) -> Result<RocketStage, ValidationError> {
        self.stage(index)?;
        let removed = self.stages.remove(index);
        self.demote_orphaned_boosters();
        Ok(removed)
    }

    /// Swap the stages at `from` and `to`. Boosters left without a core are demoted.
    pub fn move_stage(&mut self, from: usize, to: usize) -> Result<(), ValidationError> {
        self.stage(from)?;
        self.stage(to)?;
        if from != to {
            self.stages.swap(from, to);
            self.demote_orphaned_boosters();
        }
        Ok(())
    }

    pub fn set_stage_engine_count(&mut self, index: usize, count: u32) -> Result<(), ValidationError> {
        self.stage_mut(index)?.set_engine_count(count)
    }

    pub fn set_stage_mass_fraction(&mut self, index: usize, fraction: f64) -> Result<(), ValidationError> {
        self.stage_mut(index)?.set_mass_fraction(fraction)
    }

    /// Replace the cached engine stats on every stage built from `snapshot.engine_id`.
    /// Returns the number of stages touched.
    pub fn refresh_engine(&mut self, snapshot: &EngineSnapshot) -> usize {
        let mut touched = 0;
        for stage in self.stages.iter_mut().filter(|s| s.engine_id() == snapshot.engine_id) {
            stage.update_snapshot(snapshot.clone());
            touched += 1;
        }
        touched
    }

    // ==========================================
    // Booster Management
    // ==========================================

    /// Why stage `index` may not be a booster, if anything
    pub fn booster_eligibility(&self, index: usize) -> Result<(), ValidationError> {
        self.stage(index)?;
        if index == 0 {
            return Err(ValidationError::BoosterAtFirstStage);
        }
        if self.stages[index - 1].is_booster {
            return Err(ValidationError::BoosterWithoutCore {
                index,
                below: index - 1,
            });
        }
        if self.stages.get(index + 1).is_some_and(|s| s.is_booster) {
            return Err(ValidationError::BoosterUnderBooster {
                index,
                above: index + 1,
            });
        }
        Ok(())
    }

    pub fn can_be_booster(&self, index: usize) -> bool {
        self.booster_eligibility(index).is_ok()
    }

    /// Mark stage `index` as a booster (fires with the stage below) or a core stage.
    pub fn set_stage_booster(&mut self, index: usize, is_booster: bool) -> Result<(), ValidationError> {
        if is_booster {
            self.booster_eligibility(index)?;
        }
        self.stage_mut(index)?.is_booster = is_booster;
        Ok(())
    }

    /// Restructuring can leave a booster at the bottom or stacked on another booster.
    fn demote_orphaned_boosters(&mut self) {
        for i in 0..self.stages.len() {
            if !self.stages[i].is_booster {
                continue;
            }
            if i == 0 || self.stages[i - 1].is_booster {
                debug!(design = %self.name, stage = i, "booster demoted to core stage");
                self.stages[i].is_booster = false;
            }
        }
    }

    pub fn has_boosters(&self) -> bool {
        self.stages.iter().any(|s| s.is_booster)
    }

    /// Number of stages that fire sequentially (boosters excluded)
    pub fn core_stage_count(&self) -> usize {
        self.stages.iter().filter(|s| !s.is_booster).count()
    }

    /// Firing groups in ignition order
    pub fn find_booster_groups(&self) -> Vec<BoosterGroup> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_booster)
            .map(|(i, _)| BoosterGroup {
                core_stage_index: i,
                booster_index: self.stages.get(i + 1).filter(|s| s.is_booster).map(|_| i + 1),
            })
            .collect()
    }

    /// Mass riding on top of the group fired by core `core_index`:
    /// payload plus every later stage, excluding the booster attached to this core.
    pub fn mass_above_stage(&self, core_index: usize) -> f64 {
        let upper: f64 = self
            .stages
            .iter()
            .enumerate()
            .skip(core_index + 1)
            .filter(|(i, s)| !(*i == core_index + 1 && s.is_booster))
            .map(|(_, s)| s.wet_mass_kg() + s.attachment_mass_kg())
            .sum();
        upper + self.payload_mass_kg
    }

    /// Combined thrust of a group in kN
    pub fn booster_group_thrust_kn(&self, group: &BoosterGroup) -> f64 {
        group
            .stage_indices()
            .map(|i| self.stages[i].total_thrust_kn())
            .sum()
    }

    /// Wet mass of the group itself (core + booster + attachment), nothing above it
    pub fn booster_group_wet_mass_kg(&self, group: &BoosterGroup) -> f64 {
        group
            .stage_indices()
            .map(|i| self.stages[i].wet_mass_kg() + self.stages[i].attachment_mass_kg())
            .sum()
    }

    /// Delta-v of one firing group given the velocity already gained below it.
    ///
    /// A lone core fires like a single stage. With a booster the burn has two phases:
    /// both fire until the shorter burn ends, the booster is dropped with any leftover
    /// propellant, then the core finishes alone. Gravity loss is charged per phase.
    pub fn group_performance(&self, group: &BoosterGroup, cumulative_delta_v: f64) -> BurnPerformance {
        let core = &self.stages[group.core_stage_index];
        let payload = self.mass_above_stage(group.core_stage_index);

        let Some(booster_index) = group.booster_index else {
            let ideal = core.delta_v(payload);
            let effective = core.effective_delta_v(payload, cumulative_delta_v);
            return BurnPerformance {
                ideal_delta_v: ideal,
                gravity_loss: ideal - effective,
                effective_delta_v: effective,
                initial_twr: core.initial_twr(payload),
            };
        };
        let booster = &self.stages[booster_index];

        // Phase 1: everything burns
        let m0 = payload + self.booster_group_wet_mass_kg(group);
        let core_flow = core.mass_flow_kg_s();
        let booster_flow = booster.mass_flow_kg_s();
        let phase1_time = core.burn_time_seconds().min(booster.burn_time_seconds());
        let m1 = m0 - (core_flow + booster_flow) * phase1_time;
        let thrust_n = self.booster_group_thrust_kn(group) * 1000.0;
        let total_flow = core_flow + booster_flow;
        let combined_ve = if total_flow > 0.0 { thrust_n / total_flow } else { 0.0 };
        let phase1_ideal = if m1 > 0.0 { combined_ve * (m0 / m1).ln() } else { 0.0 };
        let initial_twr = thrust_n / (m0 * costs::G0);
        let phase1_effective =
            (phase1_ideal - balance::gravity_loss(phase1_ideal, initial_twr, cumulative_delta_v)).max(0.0);

        // Phase 2: core alone after jettison
        let booster_leftover = (booster.propellant_mass_kg() - booster_flow * phase1_time).max(0.0);
        let m2 = m1 - (booster.dry_mass_kg() + booster.attachment_mass_kg() + booster_leftover);
        let core_leftover = (core.propellant_mass_kg() - core_flow * phase1_time).max(0.0);
        let (phase2_ideal, phase2_effective) = if core_leftover > 0.0 && m2 > core_leftover {
            let ideal = core.exhaust_velocity_ms() * (m2 / (m2 - core_leftover)).ln();
            let twr = core.total_thrust_kn() * 1000.0 / (m2 * costs::G0);
            let loss = balance::gravity_loss(ideal, twr, cumulative_delta_v + phase1_effective);
            (ideal, (ideal - loss).max(0.0))
        } else {
            (0.0, 0.0)
        };

        let ideal = phase1_ideal + phase2_ideal;
        let effective = phase1_effective + phase2_effective;
        BurnPerformance {
            ideal_delta_v: ideal,
            gravity_loss: ideal - effective,
            effective_delta_v: effective,
            initial_twr,
        }
    }

    /// Per-group performance in firing order, each group seeing the delta-v gained before it
    pub fn burn_sequence(&self) -> Vec<(BoosterGroup, BurnPerformance)> {
        let mut cumulative = 0.0;
        self.find_booster_groups()
            .into_iter()
            .map(|group| {
                let performance = self.group_performance(&group, cumulative);
                cumulative += performance.effective_delta_v;
                (group, performance)
            })
            .collect()
    }

    fn group_for_stage(&self, stage_index: usize) -> Option<(BoosterGroup, BurnPerformance)> {
        self.burn_sequence()
            .into_iter()
            .find(|(g, _)| g.core_stage_index == stage_index)
    }

    /// Effective delta-v of the group a core stage fires. Boosters report 0;
    /// their contribution is counted with their core.
    pub fn stage_effective_delta_v(&self, stage_index: usize) -> f64 {
        self.group_for_stage(stage_index)
            .map(|(_, p)| p.effective_delta_v)
            .unwrap_or(0.0)
    }

    /// Ignition TWR of the group a core stage fires, including attached boosters
    pub fn stage_twr(&self, stage_index: usize) -> f64 {
        self.group_for_stage(stage_index)
            .map(|(_, p)| p.initial_twr)
            .unwrap_or(0.0)
    }

    /// Ideal (no gravity loss) delta-v of the whole vehicle
    pub fn total_delta_v(&self) -> f64 {
        self.burn_sequence().iter().map(|(_, p)| p.ideal_delta_v).sum()
    }

    pub fn total_effective_delta_v(&self) -> f64 {
        self.burn_sequence().iter().map(|(_, p)| p.effective_delta_v).sum()
    }

    pub fn total_gravity_loss(&self) -> f64 {
        self.burn_sequence().iter().map(|(_, p)| p.gravity_loss).sum()
    }

    /// Calculate total wet mass of the rocket (all stages + payload)
    pub fn total_wet_mass_kg(&self) -> f64 {
        let stage_mass: f64 = self
            .stages
            .iter()
            .map(|s| s.wet_mass_kg() + s.attachment_mass_kg())
            .sum();
        stage_mass + self.payload_mass_kg
    }

    /// Calculate total dry mass of the rocket (no propellant)
    pub fn total_dry_mass_kg(&self) -> f64 {
        let stage_mass: f64 = self
            .stages
            .iter()
            .map(|s| s.dry_mass_kg() + s.attachment_mass_kg())
            .sum();
        stage_mass + self.payload_mass_kg
    }

    /// Thrust-to-weight ratio at liftoff; must exceed 1.0 to leave the pad.
    pub fn liftoff_twr(&self) -> f64 {
        self.find_booster_groups()
            .first()
            .map(|group| {
                let thrust_n = self.booster_group_thrust_kn(group) * 1000.0;
                thrust_n / (self.total_wet_mass_kg() * costs::G0)
            })
            .unwrap_or(0.0)
    }

    /// Calculate how much effective delta-v margin we have (positive = excess, negative = shortfall)
    pub fn delta_v_margin(&self) -> f64 {
        self.total_effective_delta_v() - self.target_delta_v
    }

    /// Calculate effective delta-v as a percentage of target (100% = exactly sufficient)
    pub fn delta_v_percentage(&self) -> f64 {
        if self.target_delta_v == 0.0 {
            return 0.0;
        }
        (self.total_effective_delta_v() / self.target_delta_v) * 100.0
    }

    // ==========================================
    // Cost Calculations
    // ==========================================

    pub fn stage_cost(&self, stage_index: usize) -> f64 {
        self.stages
            .get(stage_index)
            .map(|s| s.cost() + costs::STAGE_OVERHEAD_COST)
            .unwrap_or(0.0)
    }

    /// Hardware plus per-stage assembly overhead
    pub fn total_stages_cost(&self) -> f64 {
        (0..self.stages.len()).map(|i| self.stage_cost(i)).sum()
    }

    /// Fixed integration cost for avionics and fairing, charged once per vehicle
    pub fn rocket_overhead_cost(&self) -> f64 {
        if self.stages.is_empty() {
            0.0
        } else {
            costs::ROCKET_OVERHEAD_COST
        }
    }

    pub fn total_cost(&self) -> f64 {
        self.total_stages_cost() + self.rocket_overhead_cost()
    }

    pub fn remaining_budget(&self) -> f64 {
        self.starting_budget - self.total_cost()
    }

    // ==========================================
    // State Predicates
    // ==========================================

    pub fn is_design_sufficient(&self) -> bool {
        !self.stages.is_empty() && self.total_effective_delta_v() >= self.target_delta_v
    }

    pub fn is_within_budget(&self) -> bool {
        self.total_cost() <= self.starting_budget
    }

    /// Check if the design is both sufficient (delta-v) and affordable (budget)
    pub fn is_launchable(&self) -> bool {
        self.is_design_sufficient() && self.is_within_budget()
    }

    // ==========================================
    // Engines and Risk
    // ==========================================

    /// Distinct engine types used anywhere in the stack
    pub fn engine_ids(&self) -> BTreeSet<EngineId> {
        self.stages.iter().map(|s| s.engine_id()).collect()
    }

    /// Closed-form chance that every event of the mission passes.
    ///
    /// `flaws` should be the flaws bound to this design and its engines;
    /// fixed ones contribute nothing. An empty plan means the flat ascent profile.
    pub fn mission_success_probability(
        &self,
        flaws: &[Flaw],
        plan: &MissionPlan,
        testing: &TestingLevels,
    ) -> f64 {
        let profile = flight_plan::build_profile(self, plan, testing);
        flight_plan::success_probability(&profile, flaws)
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value < 0.0 || value.is_nan() {
        return Err(ValidationError::NegativeValue { field, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_design::{EngineCycle, EngineDesign, FuelType};
    use proptest::prelude::*;

    fn kerolox_snap() -> EngineSnapshot {
        EngineDesign::with_defaults(FuelType::Kerolox).snapshot(1)
    }

    fn hydrolox_snap() -> EngineSnapshot {
        EngineDesign::with_defaults(FuelType::Hydrolox).snapshot(0)
    }

    fn solid_snap() -> EngineSnapshot {
        EngineDesign::with_defaults(FuelType::Solid).snapshot(2)
    }

    /// Core / booster / upper stage stack
    fn boosted_design() -> RocketDesign {
        let mut design = RocketDesign::new("Boosted");
        design.add_stage_with_count(kerolox_snap(), 9).unwrap();
        design.add_stage_with_count(solid_snap(), 2).unwrap();
        design.add_stage(hydrolox_snap()).unwrap();
        design.set_stage_booster(1, true).unwrap();
        design.set_payload_mass(2000.0).unwrap();
        design
    }

    #[test]
    fn test_new_design() {
        let design = RocketDesign::new("Test");
        assert_eq!(design.stage_count(), 0);
        assert_eq!(design.payload_mass_kg(), DEFAULT_PAYLOAD_KG);
        assert_eq!(design.target_delta_v(), TARGET_DELTA_V_MS);
        assert_eq!(design.starting_budget(), costs::STARTING_BUDGET);
        assert_eq!(design.total_cost(), 0.0);
        assert!(!design.is_launchable());
    }

    #[test]
    fn test_add_stage() {
        let mut design = RocketDesign::new("Test");
        assert_eq!(design.add_stage(kerolox_snap()).unwrap(), 0);
        assert_eq!(design.add_stage(hydrolox_snap()).unwrap(), 1);
        assert_eq!(design.stage_count(), 2);
        assert_eq!(design.add_stage_with_count(kerolox_snap(), 0), Err(ValidationError::ZeroEngineStage));
        assert_eq!(design.stage_count(), 2);
    }

    #[test]
    fn test_remove_stage() {
        let mut design = RocketDesign::new("Test");
        design.add_stage(kerolox_snap()).unwrap();
        design.add_stage(hydrolox_snap()).unwrap();

        let removed = design.remove_stage(0).unwrap();
        assert_eq!(removed.engine_id(), 1);
        assert_eq!(design.stage_count(), 1);
        assert_eq!(design.stages()[0].engine_id(), 0);
        assert_eq!(
            design.remove_stage(5),
            Err(ValidationError::StageIndexOutOfRange { index: 5, len: 1 })
        );
    }

    #[test]
    fn test_move_stage_swaps_positions() {
        let mut design = RocketDesign::new("Test");
        design.add_stage(kerolox_snap()).unwrap();
        design.add_stage(hydrolox_snap()).unwrap();
        design.add_stage(solid_snap()).unwrap();

        design.move_stage(0, 2).unwrap();
        let ids: Vec<EngineId> = design.stages().iter().map(|s| s.engine_id()).collect();
        assert_eq!(ids, vec![2, 0, 1]);
        assert!(design.move_stage(0, 3).is_err());
    }

    #[test]
    fn test_first_stage_cannot_be_booster() {
        let mut design = RocketDesign::new("Test");
        design.add_stage(kerolox_snap()).unwrap();
        assert_eq!(design.set_stage_booster(0, true), Err(ValidationError::BoosterAtFirstStage));
        assert!(!design.stages()[0].is_booster);
    }

    #[test]
    fn test_booster_needs_core_below() {
        let mut design = boosted_design();
        design.add_stage(solid_snap()).unwrap();
        // Stage 2 sits on booster stage 1
        assert_eq!(
            design.set_stage_booster(2, true),
            Err(ValidationError::BoosterWithoutCore { index: 2, below: 1 })
        );
        // Stage 0 would strand booster 1
        assert_eq!(design.set_stage_booster(0, true), Err(ValidationError::BoosterAtFirstStage));
        assert!(design.can_be_booster(3));
        assert!(!design.can_be_booster(2));
    }

    #[test]
    fn test_booster_cannot_carry_booster() {
        let mut design = RocketDesign::new("Test");
        design.add_stage(kerolox_snap()).unwrap();
        design.add_stage(hydrolox_snap()).unwrap();
        design.add_stage(solid_snap()).unwrap();
        design.set_stage_booster(2, true).unwrap();
        assert_eq!(
            design.set_stage_booster(1, true),
            Err(ValidationError::BoosterUnderBooster { index: 1, above: 2 })
        );
        design.set_stage_booster(2, false).unwrap();
        assert!(design.set_stage_booster(1, true).is_ok());
    }

    #[test]
    fn test_restructuring_demotes_orphaned_boosters() {
        let mut design = boosted_design();
        design.remove_stage(0).unwrap();
        assert!(!design.stages()[0].is_booster);

        let mut design = boosted_design();
        design.move_stage(0, 1).unwrap();
        assert!(!design.stages()[0].is_booster);
        assert!(design.stages().iter().all(|s| !s.is_booster));
    }

    #[test]
    fn test_find_booster_groups() {
        let design = boosted_design();
        let groups = design.find_booster_groups();
        assert_eq!(
            groups,
            vec![
                BoosterGroup { core_stage_index: 0, booster_index: Some(1) },
                BoosterGroup { core_stage_index: 2, booster_index: None },
            ]
        );
        assert_eq!(design.core_stage_count(), 2);
        assert!(design.has_boosters());
    }

    #[test]
    fn test_mass_above_stage_excludes_own_booster() {
        let design = boosted_design();
        let upper = &design.stages()[2];
        assert!((design.mass_above_stage(0) - (upper.wet_mass_kg() + 2000.0)).abs() < 1e-9);
        assert_eq!(design.mass_above_stage(2), 2000.0);
    }

    #[test]
    fn test_single_stage_scenario_by_hand() {
        let mut design = RocketDesign::new("Scenario");
        design.add_stage(kerolox_snap()).unwrap();
        design.set_stage_mass_fraction(0, 0.85).unwrap();
        design.set_payload_mass(1000.0).unwrap();
        design.set_target_delta_v(4500.0).unwrap();

        // e = 450, t = 0.06, f = 0.85: p = 382.5 / 0.099
        let propellant: f64 = 0.85 * 450.0 / (1.0 - 0.85 * 1.06);
        let dry = 450.0 + propellant * 0.06;
        let wet = dry + propellant;
        let ideal = 3000.0 * ((wet + 1000.0) / (dry + 1000.0)).ln();

        // 500 kN against ~5.5 t: TWR well above 4, no gravity loss
        let twr = 500_000.0 / ((wet + 1000.0) * 9.81);
        assert!(twr > 4.0);
        assert!((design.stage_twr(0) - twr).abs() < 1e-9);

        assert!((design.total_delta_v() - ideal).abs() < 1e-6);
        assert!((design.total_effective_delta_v() - ideal).abs() < 1e-6);
        assert_eq!(design.total_gravity_loss(), 0.0);
        assert!(!design.is_design_sufficient());
    }

    #[test]
    fn test_boosted_group_two_phase_burn() {
        let design = boosted_design();
        let groups = design.find_booster_groups();
        let performance = design.group_performance(&groups[0], 0.0);
        assert!(performance.effective_delta_v <= performance.ideal_delta_v);
        assert!(performance.ideal_delta_v > 0.0);

        // Combined TWR counts both thrusts against the whole stack
        let thrust = design.booster_group_thrust_kn(&groups[0]) * 1000.0;
        let m0 = design.booster_group_wet_mass_kg(&groups[0]) + design.mass_above_stage(0);
        assert!((performance.initial_twr - thrust / (m0 * 9.81)).abs() < 1e-9);
        assert!((design.stage_twr(0) - performance.initial_twr).abs() < 1e-12);
        assert_eq!(design.stage_twr(1), 0.0);
        assert_eq!(design.stage_effective_delta_v(1), 0.0);
    }

    #[test]
    fn test_boosters_add_delta_v() {
        // Matched liquid boosters burn out with the core
        let mut boosted = RocketDesign::new("Twin core");
        boosted.add_stage_with_count(kerolox_snap(), 9).unwrap();
        boosted.add_stage_with_count(kerolox_snap(), 9).unwrap();
        boosted.add_stage(hydrolox_snap()).unwrap();
        boosted.set_stage_booster(1, true).unwrap();
        boosted.set_payload_mass(2000.0).unwrap();
        let mut bare = boosted.clone();
        bare.remove_stage(1).unwrap();
        assert!(boosted.total_effective_delta_v() > bare.total_effective_delta_v());
        assert!(boosted.liftoff_twr() > bare.liftoff_twr());
    }

    #[test]
    fn test_total_effective_is_sum_of_groups() {
        let design = boosted_design();
        let sum: f64 = design.burn_sequence().iter().map(|(_, p)| p.effective_delta_v).sum();
        assert!((design.total_effective_delta_v() - sum).abs() < 1e-9);
        let by_stage = design.stage_effective_delta_v(0) + design.stage_effective_delta_v(2);
        assert!((by_stage - sum).abs() < 1e-9);
        assert!(
            (design.total_delta_v() - design.total_gravity_loss() - design.total_effective_delta_v()).abs()
                < 1e-9
        );
    }

    #[test]
    fn test_total_cost() {
        let design = boosted_design();
        let hardware: f64 = design.stages().iter().map(|s| s.cost()).sum();
        let expected = hardware + 3.0 * costs::STAGE_OVERHEAD_COST + costs::ROCKET_OVERHEAD_COST;
        assert!((design.total_cost() - expected).abs() < 1e-3);
        // Booster hardware is included once
        assert!(design.stages()[1].cost() >= costs::BOOSTER_ATTACHMENT_COST);
    }

    #[test]
    fn test_mass_totals_include_attachment() {
        let design = boosted_design();
        let stage_wet: f64 = design.stages().iter().map(|s| s.wet_mass_kg()).sum();
        assert!(
            (design.total_wet_mass_kg() - (stage_wet + costs::BOOSTER_ATTACHMENT_MASS_KG + 2000.0)).abs()
                < 1e-9
        );
        assert!(design.total_dry_mass_kg() < design.total_wet_mass_kg());
    }

    #[test]
    fn test_budget_predicates() {
        let mut design = RocketDesign::new("Cheap");
        design.add_stage_with_count(kerolox_snap(), 9).unwrap();
        design.add_stage(hydrolox_snap()).unwrap();
        design.set_payload_mass(500.0).unwrap();
        design.set_target_delta_v(100.0).unwrap();
        assert!(design.is_design_sufficient());
        assert!(design.is_within_budget());
        assert!(design.is_launchable());

        design.set_starting_budget(1.0).unwrap();
        assert!(!design.is_within_budget());
        assert!(!design.is_launchable());
        assert!(design.remaining_budget() < 0.0);
    }

    #[test]
    fn test_negative_inputs_rejected() {
        let mut design = RocketDesign::new("Test");
        assert!(matches!(
            design.set_payload_mass(-1.0),
            Err(ValidationError::NegativeValue { field: "payload_mass_kg", .. })
        ));
        assert!(design.set_target_delta_v(-5.0).is_err());
        assert_eq!(design.payload_mass_kg(), DEFAULT_PAYLOAD_KG);
    }

    #[test]
    fn test_refresh_engine_updates_matching_stages() {
        let mut design = boosted_design();
        let mut engine = EngineDesign::with_defaults(FuelType::Kerolox);
        engine.set_cycle(EngineCycle::StagedCombustion).unwrap();
        assert_eq!(design.refresh_engine(&engine.snapshot(1)), 1);
        assert_eq!(design.stages()[0].stats().cycle, EngineCycle::StagedCombustion);
        assert_eq!(design.stages()[2].stats().fuel, FuelType::Hydrolox);
    }

    #[test]
    fn test_engine_ids() {
        let design = boosted_design();
        let ids: Vec<EngineId> = design.engine_ids().into_iter().collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    proptest! {
        #[test]
        fn test_effective_never_exceeds_ideal_for_stacks(
            lower_count in 1u32..12,
            upper_count in 1u32..4,
            boosters in 0u32..4,
            payload in 0.0f64..30_000.0,
        ) {
            let mut design = RocketDesign::new("Prop");
            design.add_stage_with_count(kerolox_snap(), lower_count).unwrap();
            if boosters > 0 {
                design.add_stage_with_count(solid_snap(), boosters).unwrap();
                design.set_stage_booster(1, true).unwrap();
            }
            design.add_stage_with_count(hydrolox_snap(), upper_count).unwrap();
            design.set_payload_mass(payload).unwrap();
            for (_, p) in design.burn_sequence() {
                prop_assert!(p.effective_delta_v <= p.ideal_delta_v + 1e-9);
                prop_assert!(p.effective_delta_v >= 0.0);
            }
        }
    }
}
