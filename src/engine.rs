/// Physical and cost constants shared by the engine, stage and design models
pub mod costs {
    /// Standard gravity at Earth's surface in m/s²
    pub const G0: f64 = 9.81;

    /// Default starting budget for a design in dollars
    pub const STARTING_BUDGET: f64 = 500_000_000.0;

    /// Cost to fix a flaw when a catalog entry does not name one
    pub const FLAW_FIX_COST: f64 = 5_000_000.0;

    /// Fixed assembly overhead charged once per stage
    pub const STAGE_OVERHEAD_COST: f64 = 5_000_000.0;

    /// Whole-vehicle integration overhead (avionics, fairing)
    pub const ROCKET_OVERHEAD_COST: f64 = 10_000_000.0;

    /// Tank fabrication cost per cubic metre of propellant volume
    pub const TANK_COST_PER_M3: f64 = 100_000.0;

    /// Propellant densities in kg/m³
    /// These are effective combined densities accounting for mixture ratios
    pub const KEROLOX_DENSITY_KG_M3: f64 = 1020.0;
    pub const HYDROLOX_DENSITY_KG_M3: f64 = 290.0;
    pub const METHALOX_DENSITY_KG_M3: f64 = 830.0;
    pub const HYPERGOLIC_DENSITY_KG_M3: f64 = 1200.0;
    pub const SOLID_DENSITY_KG_M3: f64 = 1800.0;

    /// Tank structural mass as a fraction of propellant mass
    pub const KEROLOX_TANK_MASS_RATIO: f64 = 0.06;
    pub const HYDROLOX_TANK_MASS_RATIO: f64 = 0.10;
    pub const METHALOX_TANK_MASS_RATIO: f64 = 0.07;
    pub const HYPERGOLIC_TANK_MASS_RATIO: f64 = 0.05;

    /// Solid motor fixed mass ratio (propellant mass / total mass)
    pub const SOLID_MASS_RATIO: f64 = 0.88;

    /// Structural mass for booster attachment points in kg
    pub const BOOSTER_ATTACHMENT_MASS_KG: f64 = 500.0;

    /// Cost for booster attachment hardware in dollars
    pub const BOOSTER_ATTACHMENT_COST: f64 = 1_000_000.0;
}
