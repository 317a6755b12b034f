use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::balance;
use crate::engine::costs;
use crate::engine_design::{EngineId, EngineSnapshot, EngineStats, FuelType};
use crate::error::ValidationError;

/// Lowest mass fraction a liquid stage may be built with
pub const MIN_MASS_FRACTION: f64 = 0.5;
/// Highest mass fraction a liquid stage may be built with, before the tank-ratio cap
pub const MAX_MASS_FRACTION: f64 = 0.95;
/// Mass fraction of a freshly added liquid stage
pub const DEFAULT_MASS_FRACTION: f64 = 0.85;

/// Tank structure keeps `f * (1 + tank_ratio)` at or below this, so the propellant solve stays finite.
const TANK_SOLVE_HEADROOM: f64 = 0.98;

/// Valid mass-fraction range for a liquid stage burning `fuel`.
/// Heavier tank structure (Hydrolox) lowers the achievable upper bound.
pub fn mass_fraction_bounds(fuel: FuelType) -> (f64, f64) {
    let max = MAX_MASS_FRACTION.min(TANK_SOLVE_HEADROOM / (1.0 + fuel.tank_mass_ratio()));
    (MIN_MASS_FRACTION, max)
}

/// A stage in a rocket design: N engines of one type plus the propellant they burn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocketStage {
    /// Cached snapshot of engine stats
    engine: EngineSnapshot,
    engine_count: u32,
    /// Propellant / stage wet mass. Ignored for solid motors.
    mass_fraction: f64,
    /// Fires in parallel with the stage directly below it (index - 1)
    pub is_booster: bool,
}

impl RocketStage {
    pub fn new(engine: EngineSnapshot, engine_count: u32) -> Result<Self, ValidationError> {
        if engine_count == 0 {
            return Err(ValidationError::ZeroEngineStage);
        }
        let (_, max) = mass_fraction_bounds(engine.stats.fuel);
        Ok(Self {
            engine,
            engine_count,
            mass_fraction: DEFAULT_MASS_FRACTION.min(max),
            is_booster: false,
        })
    }

    pub fn engine(&self) -> &EngineSnapshot {
        &self.engine
    }

    pub fn engine_id(&self) -> EngineId {
        self.engine.engine_id
    }

    pub fn stats(&self) -> &EngineStats {
        &self.engine.stats
    }

    pub fn engine_count(&self) -> u32 {
        self.engine_count
    }

    /// Replace the cached engine stats after the engine design changed.
    /// A liquid mass fraction pushed out of range by a fuel change is clamped to the nearest bound.
    pub fn update_snapshot(&mut self, snapshot: EngineSnapshot) {
        self.engine = snapshot;
        if !self.is_solid() {
            let (min, max) = mass_fraction_bounds(self.engine.stats.fuel);
            let clamped = self.mass_fraction.clamp(min, max);
            if clamped != self.mass_fraction {
                debug!(
                    engine = %self.engine.name,
                    from = self.mass_fraction,
                    to = clamped,
                    "mass fraction clamped after engine change"
                );
                self.mass_fraction = clamped;
            }
        }
    }

    /// Check if this stage uses solid rocket motors
    pub fn is_solid(&self) -> bool {
        self.engine.stats.is_solid()
    }

    pub fn set_engine_count(&mut self, count: u32) -> Result<(), ValidationError> {
        if count == 0 {
            return Err(ValidationError::ZeroEngineStage);
        }
        self.engine_count = count;
        Ok(())
    }

    /// Propellant mass divided by stage wet mass. Fixed for solid motors.
    pub fn mass_fraction(&self) -> f64 {
        match self.engine.stats.fixed_mass_ratio {
            Some(ratio) => ratio,
            None => self.mass_fraction,
        }
    }

    /// Accepted range for `set_mass_fraction` with the current engine
    pub fn mass_fraction_bounds(&self) -> (f64, f64) {
        mass_fraction_bounds(self.engine.stats.fuel)
    }

    pub fn set_mass_fraction(&mut self, fraction: f64) -> Result<(), ValidationError> {
        if self.is_solid() {
            return Err(ValidationError::FixedMassFraction);
        }
        let (min, max) = self.mass_fraction_bounds();
        if !(min..=max).contains(&fraction) {
            return Err(ValidationError::MassFractionOutOfRange {
                fuel: self.engine.stats.fuel,
                value: fraction,
                min,
                max,
            });
        }
        self.mass_fraction = fraction;
        Ok(())
    }

    // ==========================================
    // Mass
    // ==========================================

    /// Calculate the mass of engines in this stage
    pub fn engine_mass_kg(&self) -> f64 {
        self.engine.stats.dry_mass_kg * self.engine_count as f64
    }

    /// Propellant mass solved from the mass fraction.
    ///
    /// With e = engine mass, p = propellant, t = tank ratio and f = mass fraction:
    /// f = p / (e + t*p + p), so p = f*e / (1 - f*(1+t)).
    /// Solid motors use their fixed ratio against the casing mass instead.
    pub fn propellant_mass_kg(&self) -> f64 {
        let e = self.engine_mass_kg();
        let f = self.mass_fraction();
        if self.is_solid() {
            return e * f / (1.0 - f);
        }
        let t = self.engine.stats.tank_mass_ratio;
        let denominator = 1.0 - f * (1.0 + t);
        if denominator <= 0.0 {
            return 0.0;
        }
        f * e / denominator
    }

    /// Structural mass of tanks (walls, insulation, plumbing).
    /// Zero for solid motors, whose casing is already in the engine mass.
    pub fn tank_mass_kg(&self) -> f64 {
        self.propellant_mass_kg() * self.engine.stats.tank_mass_ratio
    }

    /// Engines + tank structure, no propellant
    pub fn dry_mass_kg(&self) -> f64 {
        self.engine_mass_kg() + self.tank_mass_kg()
    }

    pub fn wet_mass_kg(&self) -> f64 {
        self.dry_mass_kg() + self.propellant_mass_kg()
    }

    /// Structural mass for booster attachment points, 0 if this stage is not a booster
    pub fn attachment_mass_kg(&self) -> f64 {
        if self.is_booster {
            costs::BOOSTER_ATTACHMENT_MASS_KG
        } else {
            0.0
        }
    }

    // ==========================================
    // Propulsion
    // ==========================================

    pub fn exhaust_velocity_ms(&self) -> f64 {
        self.engine.stats.exhaust_velocity_ms
    }

    /// Total thrust in kN
    pub fn total_thrust_kn(&self) -> f64 {
        self.engine.stats.thrust_kn * self.engine_count as f64
    }

    /// Propellant consumption of all engines at full thrust in kg/s
    pub fn mass_flow_kg_s(&self) -> f64 {
        self.engine.stats.mass_flow_kg_s() * self.engine_count as f64
    }

    /// Burn time = propellant_mass × exhaust_velocity / thrust
    pub fn burn_time_seconds(&self) -> f64 {
        let flow = self.mass_flow_kg_s();
        if flow > 0.0 {
            self.propellant_mass_kg() / flow
        } else {
            0.0
        }
    }

    /// Initial mass / burnout mass with `payload_mass_kg` riding on top (always >= 1.0)
    pub fn mass_ratio(&self, payload_mass_kg: f64) -> f64 {
        let m0 = self.wet_mass_kg() + payload_mass_kg;
        let mf = self.dry_mass_kg() + payload_mass_kg;
        if mf > 0.0 {
            m0 / mf
        } else {
            1.0
        }
    }

    /// Ideal (Tsiolkovsky) delta-v: Ve × ln(m0/mf).
    ///
    /// # Arguments
    /// * `payload_mass_kg` - Mass above this stage (payload + upper stages)
    pub fn delta_v(&self, payload_mass_kg: f64) -> f64 {
        self.exhaust_velocity_ms() * self.mass_ratio(payload_mass_kg).ln()
    }

    /// Thrust-to-weight at ignition with `payload_mass_kg` above.
    pub fn initial_twr(&self, payload_mass_kg: f64) -> f64 {
        let weight_n = (self.wet_mass_kg() + payload_mass_kg) * costs::G0;
        if weight_n > 0.0 {
            self.total_thrust_kn() * 1000.0 / weight_n
        } else {
            0.0
        }
    }

    /// Gravity loss for this stage firing alone.
    ///
    /// # Arguments
    /// * `payload_mass_kg` - Mass above this stage
    /// * `cumulative_delta_v` - Delta-v already achieved by earlier stages (shapes the ascent)
    pub fn gravity_loss(&self, payload_mass_kg: f64, cumulative_delta_v: f64) -> f64 {
        balance::gravity_loss(
            self.delta_v(payload_mass_kg),
            self.initial_twr(payload_mass_kg),
            cumulative_delta_v,
        )
    }

    /// Ideal delta-v minus gravity loss, floored at zero
    pub fn effective_delta_v(&self, payload_mass_kg: f64, cumulative_delta_v: f64) -> f64 {
        let ideal = self.delta_v(payload_mass_kg);
        (ideal - self.gravity_loss(payload_mass_kg, cumulative_delta_v)).max(0.0)
    }

    // ==========================================
    // Cost
    // ==========================================

    /// Tank volume required for the propellant in m³
    pub fn tank_volume_m3(&self) -> f64 {
        self.propellant_mass_kg() / self.engine.stats.propellant_density
    }

    pub fn engine_cost(&self) -> f64 {
        self.engine.stats.cost * self.engine_count as f64
    }

    /// Solid motors carry no separate tanks
    pub fn tank_cost(&self) -> f64 {
        if self.is_solid() {
            0.0
        } else {
            self.tank_volume_m3() * costs::TANK_COST_PER_M3
        }
    }

    pub fn attachment_cost(&self) -> f64 {
        if self.is_booster {
            costs::BOOSTER_ATTACHMENT_COST
        } else {
            0.0
        }
    }

    /// Engines, tanks and booster hardware. Assembly overhead is charged by the design.
    pub fn cost(&self) -> f64 {
        self.engine_cost() + self.tank_cost() + self.attachment_cost()
    }
}
