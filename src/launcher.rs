use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SimulationError, ValidationError};
use crate::flaw::{self, FailureCause, Flaw, FlawId};
use crate::flight_plan::{self, EventRates, LegEvents, RiskEvent, TestingLevels};
use crate::mission_plan::MissionPlan;
use crate::rocket_design::{DesignId, RocketDesign};
use crate::stage::RocketStage;

pub type SimulationId = u32;

/// Where a launch stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchStatus {
    NotStarted,
    InProgress,
    /// Every event of every leg passed
    Success,
    /// Halted at the first failed event
    Failure,
}

impl LaunchStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, LaunchStatus::Success | LaunchStatus::Failure)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            LaunchStatus::NotStarted => "Not Started",
            LaunchStatus::InProgress => "In Progress",
            LaunchStatus::Success => "Success",
            LaunchStatus::Failure => "Failure",
        }
    }
}

/// The result of evaluating one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOutcome {
    pub leg_index: usize,
    pub event_index: usize,
    pub name: String,
    pub passed: bool,
    pub rates: EventRates,
    /// None when the event passed
    pub cause: Option<FailureCause>,
    /// Flaw blamed for the failure, now known to the player
    pub discovered_flaw_id: Option<FlawId>,
}

/// Frozen copy of everything a launch reads. Later edits to the design or
/// fixes to its flaws only affect the next attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchSnapshot {
    design_id: Option<DesignId>,
    design_name: String,
    stages: Vec<RocketStage>,
    legs: Vec<LegEvents>,
    flaws: Vec<Flaw>,
}

impl LaunchSnapshot {
    /// Capture a design flying `plan`. `flaws` are the flaws bound to the design and its engines.
    pub fn capture(
        design_id: DesignId,
        design: &RocketDesign,
        flaws: Vec<Flaw>,
        plan: &MissionPlan,
        testing: &TestingLevels,
    ) -> Result<Self, ValidationError> {
        if design.stages().is_empty() {
            return Err(ValidationError::EmptyDesign);
        }
        Ok(Self {
            design_id: Some(design_id),
            design_name: design.name.clone(),
            stages: design.stages().to_vec(),
            legs: flight_plan::build_profile(design, plan, testing),
            flaws,
        })
    }

    /// Snapshot of a hand-built event profile, with no vehicle behind it
    pub fn from_profile(name: impl Into<String>, legs: Vec<LegEvents>, flaws: Vec<Flaw>) -> Self {
        Self {
            design_id: None,
            design_name: name.into(),
            stages: Vec::new(),
            legs,
            flaws,
        }
    }

    pub fn design_id(&self) -> Option<DesignId> {
        self.design_id
    }

    pub fn design_name(&self) -> &str {
        &self.design_name
    }

    pub fn stages(&self) -> &[RocketStage] {
        &self.stages
    }

    pub fn legs(&self) -> &[LegEvents] {
        &self.legs
    }

    pub fn flaws(&self) -> &[Flaw] {
        &self.flaws
    }

    pub fn event(&self, leg_index: usize, event_index: usize) -> Option<&RiskEvent> {
        self.legs.get(leg_index)?.events.get(event_index)
    }

    pub fn total_events(&self) -> usize {
        self.legs.iter().map(|l| l.events.len()).sum()
    }

    /// Closed-form success chance of this exact profile
    pub fn success_probability(&self) -> f64 {
        flight_plan::success_probability(&self.legs, &self.flaws)
    }

    pub fn total_transit_days(&self) -> u32 {
        self.legs.iter().map(|l| l.transit_days()).sum()
    }

    /// Returns true if the flaw was present and not yet discovered
    fn mark_discovered(&mut self, id: FlawId) -> bool {
        match self.flaws.iter_mut().find(|f| f.id == id) {
            Some(flaw) if !flaw.discovered => {
                flaw.discovered = true;
                true
            }
            _ => false,
        }
    }
}

/// One launch attempt, advanced one event per `step`
#[derive(Debug, Clone)]
pub struct LaunchSimulation {
    id: SimulationId,
    snapshot: LaunchSnapshot,
    rng: ChaCha8Rng,
    leg_index: usize,
    event_index: usize,
    status: LaunchStatus,
    outcomes: Vec<EventOutcome>,
}

impl LaunchSimulation {
    /// A profile with no events at all is a trivial success.
    pub fn new(id: SimulationId, snapshot: LaunchSnapshot, seed: u64) -> Self {
        let status = if snapshot.total_events() == 0 {
            LaunchStatus::Success
        } else {
            LaunchStatus::NotStarted
        };
        info!(
            simulation = id,
            design = %snapshot.design_name,
            legs = snapshot.legs.len(),
            events = snapshot.total_events(),
            "launch simulation created"
        );
        Self {
            id,
            snapshot,
            rng: ChaCha8Rng::seed_from_u64(seed),
            leg_index: 0,
            event_index: 0,
            status,
            outcomes: Vec::new(),
        }
    }

    pub fn id(&self) -> SimulationId {
        self.id
    }

    pub fn snapshot(&self) -> &LaunchSnapshot {
        &self.snapshot
    }

    pub fn status(&self) -> LaunchStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    pub fn outcomes(&self) -> &[EventOutcome] {
        &self.outcomes
    }

    pub fn success_probability(&self) -> f64 {
        self.snapshot.success_probability()
    }

    pub fn total_transit_days(&self) -> u32 {
        self.snapshot.total_transit_days()
    }

    pub fn total_events(&self) -> usize {
        self.snapshot.total_events()
    }

    /// Position of the next event to evaluate, skipping empty legs
    fn next_position(&self) -> Option<(usize, usize)> {
        let mut leg = self.leg_index;
        let mut event = self.event_index;
        while let Some(events) = self.snapshot.legs.get(leg).map(|l| &l.events) {
            if event < events.len() {
                return Some((leg, event));
            }
            leg += 1;
            event = 0;
        }
        None
    }

    /// Leg the next event belongs to
    pub fn current_leg(&self) -> Option<&LegEvents> {
        if self.is_complete() {
            return None;
        }
        self.next_position().and_then(|(leg, _)| self.snapshot.legs.get(leg))
    }

    pub fn next_event(&self) -> Option<&RiskEvent> {
        if self.is_complete() {
            return None;
        }
        self.next_position()
            .and_then(|(leg, event)| self.snapshot.event(leg, event))
    }

    /// Events not yet evaluated; zero once the launch is over
    pub fn remaining_events(&self) -> usize {
        if self.is_complete() {
            0
        } else {
            self.total_events() - self.outcomes.len()
        }
    }

    /// Evaluate exactly one event.
    pub fn step(&mut self) -> Result<EventOutcome, SimulationError> {
        if self.status.is_complete() {
            return Err(SimulationError::AlreadyComplete(self.id));
        }
        let (leg_index, event_index) = self
            .next_position()
            .ok_or(SimulationError::AlreadyComplete(self.id))?;
        self.status = LaunchStatus::InProgress;

        let (name, rates, contributors) = {
            let event = &self.snapshot.legs[leg_index].events[event_index];
            (
                event.name.clone(),
                flight_plan::event_rates(event, &self.snapshot.flaws),
                flight_plan::contributing_flaws(event, &self.snapshot.flaws),
            )
        };

        let roll: f64 = self.rng.gen();
        let passed = roll >= rates.total();

        let mut cause = None;
        let mut discovered_flaw_id = None;
        if passed {
            debug!(simulation = self.id, event = %name, roll, rate = rates.total(), "event passed");
            self.leg_index = leg_index;
            self.event_index = event_index + 1;
            if self.next_position().is_none() {
                self.status = LaunchStatus::Success;
                info!(simulation = self.id, design = %self.snapshot.design_name, "launch succeeded");
            }
        } else {
            let attributed = flaw::roll_failure_cause(&contributors, &rates, &mut self.rng);
            if let FailureCause::Flaw(id) = attributed {
                self.snapshot.mark_discovered(id);
                discovered_flaw_id = Some(id);
            }
            cause = Some(attributed);
            self.status = LaunchStatus::Failure;
            info!(
                simulation = self.id,
                event = %name,
                roll,
                rate = rates.total(),
                cause = ?attributed,
                "launch failed"
            );
        }

        let outcome = EventOutcome {
            leg_index,
            event_index,
            name,
            passed,
            rates,
            cause,
            discovered_flaw_id,
        };
        self.outcomes.push(outcome.clone());
        Ok(outcome)
    }

    /// Step until the launch ends, for callers that do not animate events
    pub fn run_to_completion(&mut self) -> LaunchStatus {
        while !self.status.is_complete() {
            if self.step().is_err() {
                break;
            }
        }
        self.status
    }
}
