//! Building configuration loading and validation
//!
//! # Hierarchy
//!
//! Configuration is layered (later overrides earlier):
//! 1. Built-in defaults
//! 2. A TOML file passed with `--config`
//! 3. CLI flags
//!
//! # Example Config
//!
//! ```toml
//! floors = 10
//! units_per_floor = 4
//! tasks = ["Plastering", "Electrical", "Plumbing", "Interior Design"]
//! stage_ms = 50
//! foundation_ms = 100
//!
//! [capacity]
//! crane = 1
//! electricity = 2
//! water = 1
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Resource;

pub const DEFAULT_FLOORS: u64 = 10;
pub const DEFAULT_UNITS_PER_FLOOR: u64 = 4;
pub const DEFAULT_STAGE_MS: u64 = 50;
pub const DEFAULT_FOUNDATION_MS: u64 = 100;
pub const DEFAULT_TASKS: [&str; 4] = ["Plastering", "Electrical", "Plumbing", "Interior Design"];

/// Per-resource capacities (also reused for peak-holder snapshots).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capacities {
    pub crane: usize,
    pub electricity: usize,
    pub water: usize,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            crane: 1,
            electricity: 2,
            water: 1,
        }
    }
}

impl Capacities {
    pub fn of(&self, resource: Resource) -> usize {
        match resource {
            Resource::Crane => self.crane,
            Resource::Electricity => self.electricity,
            Resource::Water => self.water,
        }
    }
}

/// Everything `run` needs to erect a building.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingConfig {
    pub floors: u64,
    pub units_per_floor: u64,
    pub tasks: Vec<String>,
    /// Simulated work per stage, in milliseconds.
    pub stage_ms: u64,
    /// Time to lay the foundation before floor 0 may start.
    pub foundation_ms: u64,
    pub capacity: Capacities,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            floors: DEFAULT_FLOORS,
            units_per_floor: DEFAULT_UNITS_PER_FLOOR,
            tasks: DEFAULT_TASKS.iter().map(|t| t.to_string()).collect(),
            stage_ms: DEFAULT_STAGE_MS,
            foundation_ms: DEFAULT_FOUNDATION_MS,
            capacity: Capacities::default(),
        }
    }
}

impl BuildingConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(source: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source, path)
    }

    /// Reject configurations that could never complete a floor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.floors == 0 {
            return Err(ConfigError::ZeroFloors);
        }
        if self.units_per_floor == 0 {
            return Err(ConfigError::ZeroUnits);
        }
        if self.total_units().is_none() {
            return Err(ConfigError::TooManyUnits {
                floors: self.floors,
                units_per_floor: self.units_per_floor,
            });
        }
        if self.tasks.is_empty() {
            return Err(ConfigError::NoTasks);
        }
        if let Some(index) = self.tasks.iter().position(|t| t.trim().is_empty()) {
            return Err(ConfigError::BlankTask(index));
        }
        for resource in Resource::ALL {
            if self.capacity.of(resource) == 0 {
                return Err(ConfigError::ZeroCapacity(resource));
            }
        }
        Ok(())
    }

    pub fn stage_duration(&self) -> Duration {
        Duration::from_millis(self.stage_ms)
    }

    pub fn foundation_duration(&self) -> Duration {
        Duration::from_millis(self.foundation_ms)
    }

    /// Units in the whole building; `None` when the count overflows.
    pub fn total_units(&self) -> Option<u64> {
        self.floors.checked_mul(self.units_per_floor)
    }
}
