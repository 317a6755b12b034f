//! Risk event profiles for a launch.
//!
//! Everything that turns a design into "what can go wrong, and how likely" lives
//! here, so the closed-form success estimate and the stepped simulation read the
//! same numbers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::balance;
use crate::engine_design::EngineId;
use crate::flaw::{Flaw, FlawId};
use crate::location;
use crate::mission_plan::{MissionLeg, MissionPlan};
use crate::rocket_design::RocketDesign;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Ignition,
    Liftoff,
    MaxQ,
    BoosterSeparation,
    StageSeparation,
    OrbitInsertion,
    TransferBurn,
    Landing,
    PayloadRelease,
}

impl EventKind {
    /// Ignition-type events scale with the number of engines lighting
    pub fn is_engine_event(&self) -> bool {
        matches!(self, EventKind::Ignition | EventKind::TransferBurn)
    }
}

/// A named risk point during flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub name: String,
    pub description: String,
    pub kind: EventKind,
    /// Stage index firing (or separating) during the event
    pub rocket_stage: usize,
    /// Engine types active during the event
    pub engines: Vec<EngineId>,
    /// Failure probability before flaws, fixed when the profile is built
    pub base_rate: f64,
}

/// Ordered events of one mission leg. `leg` is None for the implicit leg of a zero-leg plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegEvents {
    pub leg: Option<MissionLeg>,
    pub events: Vec<RiskEvent>,
}

impl LegEvents {
    pub fn transit_days(&self) -> u32 {
        self.leg.as_ref().map(|l| l.transit_days).unwrap_or(0)
    }
}

/// Cumulative testing effort, owned by the caller and passed in per query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestingLevels {
    pub design: f64,
    #[serde(default)]
    pub engines: BTreeMap<EngineId, f64>,
}

impl TestingLevels {
    pub fn engine(&self, id: EngineId) -> f64 {
        self.engines.get(&id).copied().unwrap_or(0.0)
    }

    pub fn with_engine(mut self, id: EngineId, level: f64) -> Self {
        self.engines.insert(id, level);
        self
    }
}

/// Failure rate split into its inherent and flaw-driven parts
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRates {
    pub base: f64,
    pub flaw: f64,
}

impl EventRates {
    /// Probability the event fails, capped at 1
    pub fn total(&self) -> f64 {
        (self.base + self.flaw).min(1.0)
    }

    /// Fraction of a failure attributable to flaws; 0 when nothing can fail
    pub fn flaw_share(&self) -> f64 {
        let sum = self.base + self.flaw;
        if sum <= 0.0 {
            0.0
        } else {
            self.flaw / sum
        }
    }
}

/// Unfixed flaws bound to this event, with their rates
pub fn contributing_flaws(event: &RiskEvent, flaws: &[Flaw]) -> Vec<(FlawId, f64)> {
    flaws
        .iter()
        .filter(|f| f.applies_to(event))
        .map(|f| (f.id, f.effective_failure_rate()))
        .filter(|(_, rate)| *rate > 0.0)
        .collect()
}

/// The one place failure rates are computed
pub fn event_rates(event: &RiskEvent, flaws: &[Flaw]) -> EventRates {
    EventRates {
        base: event.base_rate,
        flaw: contributing_flaws(event, flaws).iter().map(|(_, r)| r).sum(),
    }
}

/// Chance of passing every event: ∏(1 - total rate)
pub fn success_probability(legs: &[LegEvents], flaws: &[Flaw]) -> f64 {
    legs.iter()
        .flat_map(|leg| leg.events.iter())
        .map(|event| 1.0 - event_rates(event, flaws).total())
        .product()
}

// ==========================================
// Profile construction
// ==========================================

/// Base rate of an ignition: 1 - ∏(1 - p_engine)^count over every engine lighting
fn ignition_rate(ignitions: &[(EngineId, u32)], testing: &TestingLevels) -> f64 {
    let survive: f64 = ignitions
        .iter()
        .map(|(id, count)| {
            let p = balance::ENGINE_IGNITION_FAILURE_RATE * balance::testing_factor(testing.engine(*id));
            (1.0 - p).powi(*count as i32)
        })
        .product();
    1.0 - survive
}

fn design_rate(kind: EventKind, testing: &TestingLevels) -> f64 {
    balance::nominal_failure_rate(kind) * balance::testing_factor(testing.design)
}

fn unique_engines(ignitions: &[(EngineId, u32)]) -> Vec<EngineId> {
    let mut ids: Vec<EngineId> = ignitions.iter().map(|(id, _)| *id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn structural_event(
    name: impl Into<String>,
    description: impl Into<String>,
    kind: EventKind,
    rocket_stage: usize,
    engines: Vec<EngineId>,
    testing: &TestingLevels,
) -> RiskEvent {
    RiskEvent {
        name: name.into(),
        description: description.into(),
        kind,
        rocket_stage,
        engines,
        base_rate: design_rate(kind, testing),
    }
}

/// Ascent sequence from the pad, ending with `final_kind`
/// (Payload Release for a flat profile, Orbit Insertion when further legs follow).
pub fn ascent_events(design: &RocketDesign, testing: &TestingLevels, final_kind: EventKind) -> Vec<RiskEvent> {
    let mut events = Vec::new();
    let stages = design.stages();
    let groups = design.find_booster_groups();
    let Some(last_group) = groups.last() else {
        return events;
    };

    for (group_idx, group) in groups.iter().enumerate() {
        let stage_num = group_idx + 1;
        let core = &stages[group.core_stage_index];

        let ignitions: Vec<(EngineId, u32)> = group
            .stage_indices()
            .map(|i| (stages[i].engine_id(), stages[i].engine_count()))
            .collect();
        let group_engines = unique_engines(&ignitions);

        let description = match group.booster_index {
            Some(_) => format!("Stage {} and boosters ignite", stage_num),
            None => format!("Stage {} engines ignite", stage_num),
        };
        events.push(RiskEvent {
            name: format!("Stage {} Ignition", stage_num),
            description,
            kind: EventKind::Ignition,
            rocket_stage: group.core_stage_index,
            engines: group_engines.clone(),
            base_rate: ignition_rate(&ignitions, testing),
        });

        if group_idx == 0 {
            events.push(structural_event(
                "Liftoff",
                "Vehicle clears the tower",
                EventKind::Liftoff,
                group.core_stage_index,
                group_engines.clone(),
                testing,
            ));
            events.push(structural_event(
                "Max-Q",
                "Maximum aerodynamic pressure",
                EventKind::MaxQ,
                group.core_stage_index,
                group_engines.clone(),
                testing,
            ));
        }

        if let Some(booster_index) = group.booster_index {
            events.push(structural_event(
                format!("Stage {} Booster Separation", stage_num),
                "Boosters jettison",
                EventKind::BoosterSeparation,
                booster_index,
                vec![stages[booster_index].engine_id()],
                testing,
            ));
        }

        if group_idx < groups.len() - 1 {
            events.push(structural_event(
                format!("Stage {} Separation", stage_num),
                format!("Stage {} separates", stage_num),
                EventKind::StageSeparation,
                group.core_stage_index,
                vec![core.engine_id()],
                testing,
            ));
        }
    }

    let upper = &stages[last_group.core_stage_index];
    let (name, description) = match final_kind {
        EventKind::OrbitInsertion => ("Orbit Insertion", "Upper stage reaches parking orbit"),
        _ => ("Payload Release", "Payload deploys"),
    };
    events.push(structural_event(
        name,
        description,
        final_kind,
        last_group.core_stage_index,
        vec![upper.engine_id()],
        testing,
    ));

    events
}

/// Flat ascent-to-payload event list, used when a mission has no explicit legs
pub fn flat_events(design: &RocketDesign, testing: &TestingLevels) -> Vec<RiskEvent> {
    ascent_events(design, testing, EventKind::PayloadRelease)
}

/// In-space leg flown by the final core stage
fn transfer_events(
    design: &RocketDesign,
    leg: &MissionLeg,
    is_final_leg: bool,
    testing: &TestingLevels,
) -> Vec<RiskEvent> {
    let mut events = Vec::new();
    let Some(group) = design.find_booster_groups().last().copied() else {
        return events;
    };
    let stage = &design.stages()[group.core_stage_index];
    let engines = vec![stage.engine_id()];
    let destination = location::display_name(&leg.to);

    events.push(RiskEvent {
        name: "Transfer Burn".to_string(),
        description: format!("Burn from {} to {}", location::display_name(&leg.from), destination),
        kind: EventKind::TransferBurn,
        rocket_stage: group.core_stage_index,
        engines: engines.clone(),
        base_rate: ignition_rate(&[(stage.engine_id(), stage.engine_count())], testing),
    });

    let (name, kind) = if leg.is_landing() {
        ("Landing", EventKind::Landing)
    } else {
        ("Orbit Insertion", EventKind::OrbitInsertion)
    };
    events.push(structural_event(
        name,
        format!("Arrival at {}", destination),
        kind,
        group.core_stage_index,
        engines.clone(),
        testing,
    ));

    if is_final_leg {
        events.push(structural_event(
            "Payload Release",
            "Payload deploys",
            EventKind::PayloadRelease,
            group.core_stage_index,
            engines,
            testing,
        ));
    }
    events
}

/// Full event profile for a design flying `plan`.
/// A zero-leg plan yields one implicit leg holding the flat event list.
/// Only a first leg leaving a surface flies the ascent; a plan starting in orbit
/// opens with a transfer burn.
pub fn build_profile(design: &RocketDesign, plan: &MissionPlan, testing: &TestingLevels) -> Vec<LegEvents> {
    if plan.is_empty() {
        return vec![LegEvents {
            leg: None,
            events: flat_events(design, testing),
        }];
    }

    let leg_count = plan.leg_count();
    plan.legs
        .iter()
        .enumerate()
        .map(|(i, leg)| {
            let is_final_leg = i + 1 == leg_count;
            let events = if i == 0 && leg.departs_surface() {
                let final_kind = if is_final_leg {
                    EventKind::PayloadRelease
                } else {
                    EventKind::OrbitInsertion
                };
                ascent_events(design, testing, final_kind)
            } else {
                transfer_events(design, leg, is_final_leg, testing)
            };
            LegEvents {
                leg: Some(leg.clone()),
                events,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_design::{EngineDesign, FuelType};
    use crate::flaw::{FlawScope, FlawTrigger};

    fn names(events: &[RiskEvent]) -> Vec<&str> {
        events.iter().map(|e| e.name.as_str()).collect()
    }

    fn two_stage() -> RocketDesign {
        let mut design = RocketDesign::new("Two stage");
        design
            .add_stage_with_count(EngineDesign::with_defaults(FuelType::Kerolox).snapshot(1), 9)
            .unwrap();
        design
            .add_stage(EngineDesign::with_defaults(FuelType::Hydrolox).snapshot(0))
            .unwrap();
        design
    }

    fn flaw(id: FlawId, scope: FlawScope, trigger: FlawTrigger, rate: f64) -> Flaw {
        Flaw::new(id, "test", "Test Flaw", "", scope, trigger, rate, 1_000_000.0)
    }

    #[test]
    fn test_single_stage_events() {
        let mut design = RocketDesign::new("One");
        design
            .add_stage(EngineDesign::with_defaults(FuelType::Kerolox).snapshot(0))
            .unwrap();
        let events = flat_events(&design, &TestingLevels::default());
        assert_eq!(names(&events), vec!["Stage 1 Ignition", "Liftoff", "Max-Q", "Payload Release"]);
    }

    #[test]
    fn test_two_stage_events() {
        let events = flat_events(&two_stage(), &TestingLevels::default());
        assert_eq!(
            names(&events),
            vec![
                "Stage 1 Ignition",
                "Liftoff",
                "Max-Q",
                "Stage 1 Separation",
                "Stage 2 Ignition",
                "Payload Release"
            ]
        );
        assert_eq!(events[4].engines, vec![0]);
        assert_eq!(events[4].rocket_stage, 1);
    }

    #[test]
    fn test_booster_events() {
        let mut design = two_stage();
        design
            .add_stage_with_count(EngineDesign::with_defaults(FuelType::Solid).snapshot(2), 2)
            .unwrap();
        design.move_stage(1, 2).unwrap();
        design.set_stage_booster(1, true).unwrap();

        let events = flat_events(&design, &TestingLevels::default());
        assert_eq!(
            names(&events),
            vec![
                "Stage 1 Ignition",
                "Liftoff",
                "Max-Q",
                "Stage 1 Booster Separation",
                "Stage 1 Separation",
                "Stage 2 Ignition",
                "Payload Release"
            ]
        );
        // Core and boosters light together
        assert_eq!(events[0].engines, vec![1, 2]);
        assert_eq!(events[3].engines, vec![2]);
        assert_eq!(events[3].kind, EventKind::BoosterSeparation);
    }

    #[test]
    fn test_empty_design_has_no_events() {
        let design = RocketDesign::new("Empty");
        assert!(flat_events(&design, &TestingLevels::default()).is_empty());
        let plan = MissionPlan::from_stops(&["earth_surface", "leo", "gto"]).unwrap();
        let profile = build_profile(&design, &plan, &TestingLevels::default());
        assert!(profile.iter().all(|leg| leg.events.is_empty()));
    }

    #[test]
    fn test_ignition_rate_combines_engines() {
        let events = flat_events(&two_stage(), &TestingLevels::default());
        let expected = 1.0 - (1.0 - 0.007f64).powi(9);
        assert!((events[0].base_rate - expected).abs() < 1e-12);
        assert!((events[4].base_rate - 0.007).abs() < 1e-12);
        assert!((events[1].base_rate - 0.02).abs() < 1e-12);
        assert!((events[2].base_rate - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_testing_lowers_base_rates() {
        let untested = flat_events(&two_stage(), &TestingLevels::default());
        let testing = TestingLevels {
            design: 8.0,
            engines: BTreeMap::new(),
        }
        .with_engine(1, 8.0);
        let tested = flat_events(&two_stage(), &testing);
        assert!(tested[0].base_rate < untested[0].base_rate);
        assert!(tested[2].base_rate < untested[2].base_rate);
        // Engine 0 untested: upper ignition unchanged
        assert_eq!(tested[4].base_rate, untested[4].base_rate);
    }

    #[test]
    fn test_zero_leg_and_single_leg_profiles_match_flat() {
        let design = two_stage();
        let testing = TestingLevels::default();
        let flat = flat_events(&design, &testing);

        let implicit = build_profile(&design, &MissionPlan::empty(), &testing);
        assert_eq!(implicit.len(), 1);
        assert!(implicit[0].leg.is_none());
        assert_eq!(implicit[0].events, flat);

        let plan = MissionPlan::direct("earth_surface", "leo").unwrap();
        let single = build_profile(&design, &plan, &testing);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].events, flat);
    }

    #[test]
    fn test_multi_leg_profile() {
        let design = two_stage();
        let plan = MissionPlan::from_stops(&["earth_surface", "leo", "lunar_orbit", "lunar_surface"]).unwrap();
        let profile = build_profile(&design, &plan, &TestingLevels::default());
        assert_eq!(profile.len(), 3);
        assert_eq!(names(&profile[0].events).last(), Some(&"Orbit Insertion"));
        assert_eq!(names(&profile[1].events), vec!["Transfer Burn", "Orbit Insertion"]);
        assert_eq!(names(&profile[2].events), vec!["Transfer Burn", "Landing", "Payload Release"]);
        assert_eq!(profile[1].transit_days(), 4);
        assert!(profile[1].events[0].description.contains("Lunar Orbit"));
        assert_eq!(profile[2].events[0].engines, vec![0]);
    }

    #[test]
    fn test_orbital_departure_skips_ascent() {
        let design = two_stage();
        let testing = TestingLevels::default();
        let plan = MissionPlan::from_stops(&["leo", "gto"]).unwrap();
        let profile = build_profile(&design, &plan, &testing);
        assert_eq!(profile.len(), 1);
        assert_eq!(
            names(&profile[0].events),
            vec!["Transfer Burn", "Orbit Insertion", "Payload Release"]
        );
        assert!(profile[0]
            .events
            .iter()
            .all(|e| !matches!(e.kind, EventKind::Liftoff | EventKind::MaxQ)));

        let from_ground = MissionPlan::from_stops(&["earth_surface", "leo", "gto"]).unwrap();
        let ground_profile = build_profile(&design, &from_ground, &testing);
        assert!(success_probability(&profile, &[]) > success_probability(&ground_profile, &[]));
    }

    #[test]
    fn test_event_rates_and_share() {
        let event = RiskEvent {
            name: "Stage 1 Separation".to_string(),
            description: String::new(),
            kind: EventKind::StageSeparation,
            rocket_stage: 0,
            engines: vec![7],
            base_rate: 0.05,
        };
        let flaws = vec![
            flaw(1, FlawScope::Engine(7), FlawTrigger::Separation, 0.10),
            // Wrong engine, wrong trigger
            flaw(2, FlawScope::Engine(3), FlawTrigger::Separation, 0.20),
            flaw(3, FlawScope::Design(0), FlawTrigger::MaxQ, 0.20),
        ];
        let rates = event_rates(&event, &flaws);
        assert_eq!(rates.base, 0.05);
        assert!((rates.flaw - 0.10).abs() < 1e-12);
        assert!((rates.total() - 0.15).abs() < 1e-12);
        assert!((rates.flaw_share() - 0.10 / 0.15).abs() < 1e-12);
        assert_eq!(contributing_flaws(&event, &flaws), vec![(1, 0.10)]);
    }

    #[test]
    fn test_total_rate_is_capped() {
        let rates = EventRates { base: 0.6, flaw: 0.7 };
        assert_eq!(rates.total(), 1.0);
        assert_eq!(EventRates::default().flaw_share(), 0.0);
    }

    #[test]
    fn test_fixed_flaw_stops_contributing() {
        let design = two_stage();
        let profile = build_profile(&design, &MissionPlan::empty(), &TestingLevels::default());
        let mut flaws = vec![flaw(1, FlawScope::Design(0), FlawTrigger::MaxQ, 0.15)];
        let before = success_probability(&profile, &flaws);
        flaws[0].fixed = true;
        let after = success_probability(&profile, &flaws);
        assert!(after > before);
        assert!((after - success_probability(&profile, &[])).abs() < 1e-15);
    }

    #[test]
    fn test_success_probability_is_product() {
        let design = two_stage();
        let profile = build_profile(&design, &MissionPlan::empty(), &TestingLevels::default());
        let expected: f64 = profile[0].events.iter().map(|e| 1.0 - e.base_rate).product();
        assert!((success_probability(&profile, &[]) - expected).abs() < 1e-15);
        let via_design =
            design.mission_success_probability(&[], &MissionPlan::empty(), &TestingLevels::default());
        assert_eq!(via_design, success_probability(&profile, &[]));
    }
}
