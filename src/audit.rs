//! Replays an event stream and checks the scheduling invariants.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::{BuildingConfig, Capacities};
use crate::events::{Event, EventKind};
use crate::types::{FloorId, Resource, Stage, UnitId, floor_of, task_for};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// More units inside a resource stage than its capacity allows.
    Capacity {
        resource: Resource,
        seen: usize,
        capacity: usize,
    },
    /// Work for a floor began before the previous floor was finished.
    FloorOverlap { floor: FloorId, unit: Option<UnitId> },
    FoundationSkipped,
    IdentityMismatch { floor: FloorId, unit: UnitId },
    DuplicateUnit { unit: UnitId },
    TaskMismatch { unit: UnitId, task: String },
    /// Floor declared finished with a report count other than the floor size.
    BarrierCount { floor: FloorId, reported: u64 },
    StageOrder { unit: UnitId, stage: Stage },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capacity { resource, seen, capacity } => {
                write!(f, "{resource}: {seen} holders exceeds capacity {capacity}")
            }
            Self::FloorOverlap { floor, unit: Some(unit) } => {
                write!(f, "unit {unit} on floor {floor} started before the floor below finished")
            }
            Self::FloorOverlap { floor, unit: None } => {
                write!(f, "floor {floor} started before the floor below finished")
            }
            Self::FoundationSkipped => write!(f, "floor started before the foundation was laid"),
            Self::IdentityMismatch { floor, unit } => {
                write!(f, "unit {unit} does not belong to floor {floor}")
            }
            Self::DuplicateUnit { unit } => write!(f, "unit {unit} assigned twice"),
            Self::TaskMismatch { unit, task } => write!(f, "unit {unit} got unexpected task {task:?}"),
            Self::BarrierCount { floor, reported } => {
                write!(f, "floor {floor} finished with {reported} reports")
            }
            Self::StageOrder { unit, stage } => write!(f, "unit {unit} ran {stage} out of order"),
        }
    }
}

#[derive(Debug, Default)]
pub struct AuditReport {
    /// Peak concurrent units inside each resource-holding stage.
    pub peak: HashMap<Resource, usize>,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn peak_of(&self, resource: Resource) -> usize {
        self.peak.get(&resource).copied().unwrap_or(0)
    }

    pub fn peaks(&self) -> Capacities {
        Capacities {
            crane: self.peak_of(Resource::Crane),
            electricity: self.peak_of(Resource::Electricity),
            water: self.peak_of(Resource::Water),
        }
    }

    pub fn has_capacity_violation(&self) -> bool {
        self.violations
            .iter()
            .any(|v| matches!(v, Violation::Capacity { .. }))
    }

    pub fn has_floor_overlap(&self) -> bool {
        self.violations
            .iter()
            .any(|v| matches!(v, Violation::FloorOverlap { .. }))
    }
}

#[derive(Default)]
struct Replay {
    foundation_laid: bool,
    finished_floors: HashSet<FloorId>,
    reports: HashMap<FloorId, u64>,
    assigned: HashSet<UnitId>,
    /// Last stage each unit finished, and the stage it is inside, if any.
    progress: HashMap<UnitId, (u8, Option<Stage>)>,
    inside: HashMap<Resource, usize>,
}

impl Replay {
    fn floor_below_done(&self, floor: FloorId, units_per_floor: u64) -> bool {
        floor == 0
            || (self.finished_floors.contains(&(floor - 1))
                && self.reports.get(&(floor - 1)).copied().unwrap_or(0) == units_per_floor)
    }
}

/// Check `events` (in `seq` order) against the rules `config` implies.
pub fn audit(events: &[Event], config: &BuildingConfig) -> AuditReport {
    let upf = config.units_per_floor.max(1);
    let mut report = AuditReport::default();
    let mut replay = Replay::default();
    let violations = &mut report.violations;

    for event in events {
        match &event.kind {
            EventKind::FoundationLaid => replay.foundation_laid = true,
            EventKind::FloorStarted { floor } => {
                if !replay.foundation_laid {
                    violations.push(Violation::FoundationSkipped);
                }
                if !replay.floor_below_done(*floor, upf) {
                    violations.push(Violation::FloorOverlap { floor: *floor, unit: None });
                }
            }
            EventKind::FloorFinished { floor } => {
                let reported = replay.reports.get(floor).copied().unwrap_or(0);
                if reported != upf {
                    violations.push(Violation::BarrierCount { floor: *floor, reported });
                }
                replay.finished_floors.insert(*floor);
            }
            EventKind::UnitAssigned { floor, unit, task } => {
                if *unit == 0 || floor_of(*unit, upf) != *floor {
                    violations.push(Violation::IdentityMismatch { floor: *floor, unit: *unit });
                }
                if !replay.assigned.insert(*unit) {
                    violations.push(Violation::DuplicateUnit { unit: *unit });
                }
                if task_for(*unit, &config.tasks) != Some(task.as_str()) {
                    violations.push(Violation::TaskMismatch {
                        unit: *unit,
                        task: task.clone(),
                    });
                }
                if !replay.floor_below_done(*floor, upf) {
                    violations.push(Violation::FloorOverlap {
                        floor: *floor,
                        unit: Some(*unit),
                    });
                }
            }
            EventKind::UnitStageStarted { floor, unit, stage } => {
                let entry = replay.progress.entry(*unit).or_insert((0, None));
                if entry.1.is_some() || entry.0 + 1 != stage.number() {
                    violations.push(Violation::StageOrder { unit: *unit, stage: *stage });
                }
                entry.1 = Some(*stage);
                if *stage == Stage::Crane && !replay.floor_below_done(*floor, upf) {
                    violations.push(Violation::FloorOverlap {
                        floor: *floor,
                        unit: Some(*unit),
                    });
                }
                if let Some(resource) = stage.resource() {
                    let inside = replay.inside.entry(resource).or_insert(0);
                    *inside += 1;
                    let peak = report.peak.entry(resource).or_insert(0);
                    *peak = (*peak).max(*inside);
                    let capacity = config.capacity.of(resource);
                    if *inside > capacity {
                        violations.push(Violation::Capacity {
                            resource,
                            seen: *inside,
                            capacity,
                        });
                    }
                }
            }
            EventKind::UnitStageFinished { floor, unit, stage } => {
                let entry = replay.progress.entry(*unit).or_insert((0, None));
                if entry.1 != Some(*stage) {
                    violations.push(Violation::StageOrder { unit: *unit, stage: *stage });
                }
                *entry = (stage.number(), None);
                if let Some(resource) = stage.resource() {
                    let inside = replay.inside.entry(resource).or_insert(0);
                    *inside = inside.saturating_sub(1);
                }
                if *stage == Stage::Report {
                    *replay.reports.entry(*floor).or_insert(0) += 1;
                }
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stream(kinds: Vec<EventKind>) -> Vec<Event> {
        kinds
            .into_iter()
            .enumerate()
            .map(|(seq, kind)| Event {
                seq: seq as u64,
                elapsed: Duration::ZERO,
                kind,
            })
            .collect()
    }

    fn one_unit_floor(floor: FloorId, unit: UnitId, task: &str) -> Vec<EventKind> {
        let mut kinds = vec![
            EventKind::FloorStarted { floor },
            EventKind::UnitAssigned {
                floor,
                unit,
                task: task.to_string(),
            },
        ];
        for stage in Stage::PIPELINE {
            kinds.push(EventKind::UnitStageStarted { floor, unit, stage });
            kinds.push(EventKind::UnitStageFinished { floor, unit, stage });
        }
        kinds.push(EventKind::FloorFinished { floor });
        kinds
    }

    fn single_unit_config(floors: u64) -> BuildingConfig {
        BuildingConfig {
            floors,
            units_per_floor: 1,
            tasks: vec!["A".to_string(), "B".to_string()],
            ..BuildingConfig::default()
        }
    }

    #[test]
    fn sequential_floors_are_clean() {
        let mut kinds = vec![EventKind::FoundationLaid];
        kinds.extend(one_unit_floor(0, 1, "B"));
        kinds.extend(one_unit_floor(1, 2, "A"));
        let report = audit(&stream(kinds), &single_unit_config(2));
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.peak_of(Resource::Crane), 1);
    }

    #[test]
    fn detects_capacity_overrun() {
        let config = BuildingConfig {
            floors: 1,
            units_per_floor: 2,
            ..BuildingConfig::default()
        };
        let kinds = vec![
            EventKind::FoundationLaid,
            EventKind::FloorStarted { floor: 0 },
            EventKind::UnitStageStarted { floor: 0, unit: 1, stage: Stage::Crane },
            EventKind::UnitStageStarted { floor: 0, unit: 2, stage: Stage::Crane },
        ];
        let report = audit(&stream(kinds), &config);
        assert!(report.has_capacity_violation());
        assert_eq!(report.peak_of(Resource::Crane), 2);
    }

    #[test]
    fn detects_floor_overlap_and_missing_foundation() {
        let mut kinds = Vec::new();
        let mut floor0 = one_unit_floor(0, 1, "B");
        let finished = floor0.pop().expect("floor finished event");
        kinds.extend(floor0);
        kinds.extend(one_unit_floor(1, 2, "A"));
        kinds.push(finished);
        let report = audit(&stream(kinds), &single_unit_config(2));
        assert!(report.has_floor_overlap());
        assert!(report.violations.contains(&Violation::FoundationSkipped));
    }

    #[test]
    fn detects_identity_task_and_stage_order_problems() {
        let config = single_unit_config(1);
        let kinds = vec![
            EventKind::FoundationLaid,
            EventKind::FloorStarted { floor: 0 },
            EventKind::UnitAssigned { floor: 0, unit: 3, task: "A".to_string() },
            EventKind::UnitAssigned { floor: 0, unit: 3, task: "B".to_string() },
            EventKind::UnitStageStarted { floor: 0, unit: 3, stage: Stage::Plumbing },
            EventKind::FloorFinished { floor: 0 },
        ];
        let report = audit(&stream(kinds), &config);
        assert!(report.violations.contains(&Violation::IdentityMismatch { floor: 0, unit: 3 }));
        assert!(report.violations.contains(&Violation::DuplicateUnit { unit: 3 }));
        assert!(report.violations.contains(&Violation::StageOrder {
            unit: 3,
            stage: Stage::Plumbing
        }));
        assert!(report.violations.contains(&Violation::BarrierCount { floor: 0, reported: 0 }));
    }
}
