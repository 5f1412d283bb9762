//! Error types for the construction scheduler.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Resource, UnitId};

/// Structural problems with a building configuration, caught before any unit runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("floor count must be > 0")]
    ZeroFloors,

    #[error("units per floor must be > 0")]
    ZeroUnits,

    #[error("task list must not be empty")]
    NoTasks,

    #[error("task name at index {0} is blank")]
    BlankTask(usize),

    #[error("{floors} floors of {units_per_floor} units overflows unit numbering")]
    TooManyUnits { floors: u64, units_per_floor: u64 },

    #[error("{0} capacity must be > 0")]
    ZeroCapacity(Resource),

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Core error type for a construction run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A unit released a resource it did not hold.
    #[error("invalid release: unit {unit} does not hold the {resource}")]
    InvalidRelease { resource: Resource, unit: UnitId },

    /// A unit tried to take a resource it already holds.
    #[error("reentrant acquire: unit {unit} already holds the {resource}")]
    ReentrantAcquire { resource: Resource, unit: UnitId },

    #[error("failed to spawn {what}: {source}")]
    Spawn {
        what: String,
        #[source]
        source: io::Error,
    },

    /// The foundation thread ended without laying the foundation.
    #[error("foundation was never laid")]
    FoundationAbandoned,

    #[error("unit {unit} panicked")]
    UnitPanicked { unit: UnitId },
}

impl Error {
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;
