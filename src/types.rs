//! Shared identifiers and the fixed stage/resource model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Zero-based index of a floor.
pub type FloorId = u64;
/// Building-wide unit (apartment) number, starting at 1.
pub type UnitId = u64;

/// Global identity of the `local`-th unit (0-based) on `floor`; `None` on overflow.
pub fn unit_id(floor: FloorId, local: u64, units_per_floor: u64) -> Option<UnitId> {
    floor
        .checked_mul(units_per_floor)?
        .checked_add(local)?
        .checked_add(1)
}

/// Floor that owns `unit`.
pub fn floor_of(unit: UnitId, units_per_floor: u64) -> FloorId {
    (unit - 1) / units_per_floor
}

/// Final task for `unit`, cycling through `tasks` by `unit mod len`.
pub fn task_for(unit: UnitId, tasks: &[String]) -> Option<&str> {
    if tasks.is_empty() {
        return None;
    }
    let index = (unit % tasks.len() as u64) as usize;
    Some(tasks[index].as_str())
}

/// A capacity-limited resource held in the shared pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Crane,
    Electricity,
    Water,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Crane, Resource::Electricity, Resource::Water];

    pub fn name(self) -> &'static str {
        match self {
            Self::Crane => "crane",
            Self::Electricity => "electricity",
            Self::Water => "water",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Crane => 0,
            Self::Electricity => 1,
            Self::Water => 2,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step of the per-unit pipeline, executed strictly in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Crane,
    Electrical,
    Plumbing,
    FinalTask,
    Report,
}

impl Stage {
    pub const PIPELINE: [Stage; 5] = [
        Stage::Crane,
        Stage::Electrical,
        Stage::Plumbing,
        Stage::FinalTask,
        Stage::Report,
    ];

    /// 1-based position in the pipeline.
    pub fn number(self) -> u8 {
        match self {
            Self::Crane => 1,
            Self::Electrical => 2,
            Self::Plumbing => 3,
            Self::FinalTask => 4,
            Self::Report => 5,
        }
    }

    /// Pool resource held for the duration of this stage, if any.
    pub fn resource(self) -> Option<Resource> {
        match self {
            Self::Crane => Some(Resource::Crane),
            Self::Electrical => Some(Resource::Electricity),
            Self::Plumbing => Some(Resource::Water),
            Self::FinalTask | Self::Report => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Crane => "crane work",
            Self::Electrical => "electrical wiring",
            Self::Plumbing => "plumbing",
            Self::FinalTask => "final task",
            Self::Report => "completion report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.number(), self.label())
    }
}
