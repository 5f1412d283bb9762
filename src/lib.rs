//! Floor-by-floor construction scheduler.
//!
//! Units (apartments) on a floor run concurrently and contend for a small
//! pool of capacity-limited resources. Floors run strictly one after another,
//! gated by a per-floor completion barrier and a one-shot foundation latch.

pub mod audit;
pub mod barrier;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod pool;
pub mod types;
pub mod unit;

pub use audit::{AuditReport, Violation, audit};
pub use config::{BuildingConfig, Capacities};
pub use error::{ConfigError, Error, Result};
pub use events::{ChannelSink, Event, EventKind, EventSink, NullSink};
pub use orchestrator::{BuildReport, OrchestratorState, run, run_with_sink};
pub use types::{FloorId, Resource, Stage, UnitId};
