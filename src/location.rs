/// A place a mission can depart from or arrive at
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: &'static str,
    pub display_name: &'static str,
    pub short_name: &'static str,
    /// Surfaces are launched from and landed on; everything else is an orbit or Lagrange point
    pub is_surface: bool,
}

/// One entry of the fixed transfer table
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub from: &'static str,
    pub to: &'static str,
    pub delta_v: f64,
    pub aero_drag_loss: f64,
    /// Transit time in game-days for this transfer leg
    pub transit_days: u32,
}

impl Transfer {
    /// Total delta-v cost including aerodynamic drag losses
    pub fn total_delta_v(&self) -> f64 {
        self.delta_v + self.aero_drag_loss
    }
}

pub const LOCATIONS: &[Location] = &[
    Location { id: "earth_surface", display_name: "Earth Surface", short_name: "EARTH", is_surface: true },
    Location { id: "suborbital", display_name: "Suborbital", short_name: "SUB", is_surface: false },
    Location { id: "leo", display_name: "Low Earth Orbit", short_name: "LEO", is_surface: false },
    Location { id: "sso", display_name: "Sun-Synchronous Orbit", short_name: "SSO", is_surface: false },
    Location { id: "meo", display_name: "Medium Earth Orbit", short_name: "MEO", is_surface: false },
    Location { id: "gto", display_name: "Geostationary Transfer", short_name: "GTO", is_surface: false },
    Location { id: "geo", display_name: "Geostationary Orbit", short_name: "GEO", is_surface: false },
    Location { id: "l1", display_name: "Earth-Moon L1", short_name: "L1", is_surface: false },
    Location { id: "lunar_orbit", display_name: "Lunar Orbit", short_name: "LLO", is_surface: false },
    Location { id: "lunar_surface", display_name: "Lunar Surface", short_name: "MOON", is_surface: true },
];

/// Directed per-leg delta-v and transit-time table.
pub const TRANSFERS: &[Transfer] = &[
    // ballistic arc
    Transfer { from: "earth_surface", to: "suborbital", delta_v: 3500.0, aero_drag_loss: 0.0, transit_days: 0 },
    Transfer { from: "earth_surface", to: "leo", delta_v: 7800.0, aero_drag_loss: 300.0, transit_days: 0 },
    Transfer { from: "leo", to: "sso", delta_v: 500.0, aero_drag_loss: 0.0, transit_days: 0 },
    Transfer { from: "leo", to: "meo", delta_v: 2100.0, aero_drag_loss: 0.0, transit_days: 0 },
    Transfer { from: "leo", to: "gto", delta_v: 2440.0, aero_drag_loss: 0.0, transit_days: 1 },
    // circularization burn
    Transfer { from: "gto", to: "geo", delta_v: 1500.0, aero_drag_loss: 0.0, transit_days: 0 },
    // 3-body trajectory
    Transfer { from: "leo", to: "l1", delta_v: 3150.0, aero_drag_loss: 0.0, transit_days: 5 },
    Transfer { from: "l1", to: "lunar_orbit", delta_v: 700.0, aero_drag_loss: 0.0, transit_days: 2 },
    Transfer { from: "leo", to: "lunar_orbit", delta_v: 3850.0, aero_drag_loss: 0.0, transit_days: 4 },
    // powered descent and ascent
    Transfer { from: "lunar_orbit", to: "lunar_surface", delta_v: 1700.0, aero_drag_loss: 0.0, transit_days: 0 },
    Transfer { from: "lunar_surface", to: "lunar_orbit", delta_v: 1700.0, aero_drag_loss: 0.0, transit_days: 0 },
];

/// Look up a location by ID
pub fn location(id: &str) -> Option<&'static Location> {
    LOCATIONS.iter().find(|l| l.id == id)
}

/// Get a direct transfer between two locations (if one exists)
pub fn transfer(from: &str, to: &str) -> Option<&'static Transfer> {
    TRANSFERS.iter().find(|t| t.from == from && t.to == to)
}

/// Get all transfers originating from a location
pub fn transfers_from(id: &str) -> impl Iterator<Item = &'static Transfer> + '_ {
    TRANSFERS.iter().filter(move |t| t.from == id)
}

pub fn is_surface(id: &str) -> bool {
    location(id).map(|l| l.is_surface).unwrap_or(false)
}

/// Human-readable name, falling back to the raw id for unknown locations
pub fn display_name(id: &str) -> &str {
    location(id).map(|l| l.display_name).unwrap_or(id)
}

/// Abbreviated name for route labels, falling back to the raw id
pub fn short_name(id: &str) -> &str {
    location(id).map(|l| l.short_name).unwrap_or(id)
}
