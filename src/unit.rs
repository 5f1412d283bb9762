//! Per-unit stage pipeline.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::barrier::FloorBarrier;
use crate::error::Result;
use crate::events::{EventKind, Recorder};
use crate::pool::ResourcePool;
use crate::types::{FloorId, Stage, UnitId};

/// Shared handles a unit needs; cloned once per spawned unit.
#[derive(Clone)]
pub struct Site {
    pub pool: Arc<ResourcePool>,
    pub barrier: Arc<FloorBarrier>,
    pub recorder: Arc<Recorder>,
    pub work: Duration,
}

/// One apartment under construction.
pub struct UnitWorker {
    pub id: UnitId,
    pub floor: FloorId,
    pub task: String,
    site: Site,
}

impl UnitWorker {
    pub fn new(id: UnitId, floor: FloorId, task: impl Into<String>, site: Site) -> Self {
        Self {
            id,
            floor,
            task: task.into(),
            site,
        }
    }

    /// Execute every stage in order, then report to the floor barrier.
    /// Consumes the worker: the pipeline runs exactly once per unit.
    pub fn run(self) -> Result<()> {
        self.site.recorder.emit(EventKind::UnitAssigned {
            floor: self.floor,
            unit: self.id,
            task: self.task.clone(),
        });
        for stage in Stage::PIPELINE {
            self.run_stage(stage)?;
        }
        Ok(())
    }

    fn run_stage(&self, stage: Stage) -> Result<()> {
        let recorder = &self.site.recorder;
        match stage.resource() {
            Some(resource) => {
                let hold = self.site.pool.acquire(resource, self.id)?;
                recorder.stage_started(self.floor, self.id, stage);
                self.work();
                recorder.stage_finished(self.floor, self.id, stage);
                hold.release()?;
            }
            None if stage == Stage::Report => {
                recorder.stage_started(self.floor, self.id, stage);
                let done = self.site.barrier.report_done(self.id);
                debug!(unit = self.id, floor = self.floor, done, "reported");
                recorder.stage_finished(self.floor, self.id, stage);
            }
            None => {
                recorder.stage_started(self.floor, self.id, stage);
                debug!(unit = self.id, task = %self.task, "final task");
                self.work();
                recorder.stage_finished(self.floor, self.id, stage);
            }
        }
        Ok(())
    }

    fn work(&self) {
        if !self.site.work.is_zero() {
            thread::sleep(self.site.work);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Capacities;
    use crate::events::{Event, NullSink};

    fn site(units: u64) -> Site {
        let barrier = Arc::new(FloorBarrier::new());
        barrier.reset(units);
        Site {
            pool: Arc::new(ResourcePool::new(&Capacities::default()).expect("pool")),
            barrier,
            recorder: Arc::new(Recorder::new(Box::new(NullSink))),
            work: Duration::ZERO,
        }
    }

    #[test]
    fn pipeline_runs_stages_in_order_and_reports_once() {
        let site = site(1);
        UnitWorker::new(5, 1, "Plumbing", site.clone())
            .run()
            .expect("unit run");
        assert_eq!(site.barrier.completed(), 1);
        for resource in crate::types::Resource::ALL {
            assert!(site.pool.holders(resource).is_empty());
        }

        let events: Vec<Event> = site.recorder.take_events();
        assert_eq!(
            events[0].kind,
            EventKind::UnitAssigned {
                floor: 1,
                unit: 5,
                task: "Plumbing".to_string()
            }
        );
        let stages: Vec<(bool, Stage)> = events[1..]
            .iter()
            .map(|event| match &event.kind {
                EventKind::UnitStageStarted { stage, .. } => (true, *stage),
                EventKind::UnitStageFinished { stage, .. } => (false, *stage),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        let expected: Vec<(bool, Stage)> = Stage::PIPELINE
            .iter()
            .flat_map(|stage| [(true, *stage), (false, *stage)])
            .collect();
        assert_eq!(stages, expected);
    }

    #[test]
    fn unit_blocked_on_held_crane_waits() {
        let site = site(1);
        let crane = site
            .pool
            .acquire(crate::types::Resource::Crane, 99)
            .expect("hold crane");

        let worker = UnitWorker::new(1, 0, "Paint", site.clone());
        let handle = thread::spawn(move || worker.run());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(site.barrier.completed(), 0);

        crane.release().expect("release crane");
        handle
            .join()
            .expect("unit panicked")
            .expect("unit run");
        assert_eq!(site.barrier.completed(), 1);
    }

    #[test]
    fn unit_unwinding_mid_stage_returns_its_crane() {
        let mut site = site(1);
        site.recorder = Arc::new(Recorder::new(Box::new(|event: &Event| {
            if matches!(
                event.kind,
                EventKind::UnitStageStarted {
                    stage: Stage::Crane,
                    ..
                }
            ) {
                panic!("sink failed");
            }
        })));

        let worker = UnitWorker::new(1, 0, "Paint", site.clone());
        let handle = thread::spawn(move || worker.run());
        assert!(handle.join().is_err());
        assert!(
            site.pool
                .holders(crate::types::Resource::Crane)
                .is_empty()
        );
        assert_eq!(site.barrier.completed(), 0);
    }
}
