use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::costs;
use crate::error::{CatalogError, ConfigError};
use crate::flaw::FlawCatalog;
use crate::world_seed::WorldSeed;

/// Settings for a [`Company`](crate::company::Company).
///
/// Every field is optional in TOML:
///
/// ```toml
/// world_seed = 42
/// starting_budget = 500_000_000.0
/// flaw_catalog = "data/flaw_catalog.toml"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Fixed world seed. A random one is drawn when absent.
    pub world_seed: Option<u64>,
    /// Budget new designs start with
    pub starting_budget: f64,
    /// Catalog file replacing the built-in flaw templates
    pub flaw_catalog: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            world_seed: None,
            starting_budget: costs::STARTING_BUDGET,
            flaw_catalog: None,
        }
    }
}

impl CoreConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            world_seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.starting_budget < 0.0 || !self.starting_budget.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "starting_budget must be a non-negative number, got {}",
                self.starting_budget
            )));
        }
        Ok(())
    }

    pub fn world_seed(&self) -> WorldSeed {
        match self.world_seed {
            Some(seed) => WorldSeed::new(seed),
            None => WorldSeed::random(),
        }
    }

    pub fn flaw_catalog(&self) -> Result<FlawCatalog, CatalogError> {
        match &self.flaw_catalog {
            Some(path) => FlawCatalog::load(path),
            None => FlawCatalog::builtin(),
        }
    }
}
