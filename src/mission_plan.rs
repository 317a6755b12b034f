use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::location;

/// A single leg of a multi-leg mission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionLeg {
    pub from: String,
    pub to: String,
    pub delta_v_required: f64,
    /// Transit time in game-days for this leg. Carries no failure risk.
    pub transit_days: u32,
}

impl MissionLeg {
    /// Whether this leg ends on a surface (a landing)
    pub fn is_landing(&self) -> bool {
        location::is_surface(&self.to)
    }

    pub fn departs_surface(&self) -> bool {
        location::is_surface(&self.from)
    }
}

/// A mission decomposed into sequential transfer legs.
/// An empty plan is valid: launches then fall back to a single implicit leg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionPlan {
    pub legs: Vec<MissionLeg>,
    pub total_delta_v: f64,
}

impl MissionPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a plan visiting `stops` in order. Every consecutive pair must have a
    /// direct entry in the transfer table; no route search is attempted.
    pub fn from_stops(stops: &[&str]) -> Result<Self, ValidationError> {
        for stop in stops {
            if location::location(stop).is_none() {
                return Err(ValidationError::UnknownLocation(stop.to_string()));
            }
        }

        let mut legs = Vec::with_capacity(stops.len().saturating_sub(1));
        for pair in stops.windows(2) {
            let transfer =
                location::transfer(pair[0], pair[1]).ok_or_else(|| ValidationError::NoDirectTransfer {
                    from: pair[0].to_string(),
                    to: pair[1].to_string(),
                })?;
            legs.push(MissionLeg {
                from: transfer.from.to_string(),
                to: transfer.to.to_string(),
                delta_v_required: transfer.total_delta_v(),
                transit_days: transfer.transit_days,
            });
        }

        let total_delta_v = legs.iter().map(|l| l.delta_v_required).sum();
        Ok(MissionPlan { legs, total_delta_v })
    }

    /// Single-leg plan between two locations
    pub fn direct(from: &str, to: &str) -> Result<Self, ValidationError> {
        Self::from_stops(&[from, to])
    }

    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Total transit time across all legs in game-days
    pub fn total_transit_days(&self) -> u32 {
        self.legs.iter().map(|l| l.transit_days).sum()
    }

    pub fn destination(&self) -> Option<&str> {
        self.legs.last().map(|l| l.to.as_str())
    }

    /// Stops joined by arrows, e.g. "EARTH -> LEO -> GTO"
    pub fn route_label(&self) -> String {
        let Some(first) = self.legs.first() else {
            return String::new();
        };
        std::iter::once(first.from.as_str())
            .chain(self.legs.iter().map(|l| l.to.as_str()))
            .map(location::short_name)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
