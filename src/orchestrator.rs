//! Floor-by-floor orchestration and the public `run` entry points.

use std::sync::Arc;
use std::thread;

use tracing::{debug, info, info_span, warn};

use crate::barrier::{FloorBarrier, FoundationLatch, LatchGuard};
use crate::config::{BuildingConfig, Capacities};
use crate::error::{ConfigError, Error, Result};
use crate::events::{Event, EventKind, EventSink, NullSink, Recorder};
use crate::pool::ResourcePool;
use crate::types::{FloorId, UnitId, task_for, unit_id};
use crate::unit::{Site, UnitWorker};

/// Orchestrator progress. Cycles `FloorInProgress -> FloorComplete` once per
/// floor, then ends in `Done`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    FloorInProgress(FloorId),
    FloorComplete(FloorId),
    Done,
}

impl OrchestratorState {
    pub fn can_advance_to(self, next: OrchestratorState) -> bool {
        use OrchestratorState::*;
        match (self, next) {
            (Idle, FloorInProgress(0)) => true,
            (FloorInProgress(a), FloorComplete(b)) => a == b,
            (FloorComplete(a), FloorInProgress(b)) => b == a + 1,
            (FloorComplete(_), Done) => true,
            _ => false,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct BuildReport {
    pub events: Vec<Event>,
    pub floors_completed: u64,
    /// Highest simultaneous holders observed per resource.
    pub peak_holders: Capacities,
}

impl BuildReport {
    pub fn units_completed(&self) -> usize {
        self.events
            .iter()
            .filter(|event| {
                matches!(
                    event.kind,
                    EventKind::UnitStageFinished {
                        stage: crate::types::Stage::Report,
                        ..
                    }
                )
            })
            .count()
    }
}

struct Orchestrator<'a> {
    config: &'a BuildingConfig,
    state: OrchestratorState,
    site: Site,
    foundation: Arc<FoundationLatch>,
}

impl Orchestrator<'_> {
    fn advance(&mut self, next: OrchestratorState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal orchestrator transition {:?} -> {next:?}",
            self.state
        );
        debug!(from = ?self.state, to = ?next, "orchestrator transition");
        self.state = next;
    }

    fn build_floor(&mut self, floor: FloorId) -> Result<()> {
        let span = info_span!("floor", floor);
        let _entered = span.enter();

        if !self.foundation.wait() {
            return Err(Error::FoundationAbandoned);
        }
        self.advance(OrchestratorState::FloorInProgress(floor));

        let units = self.config.units_per_floor;
        // Reset before any unit exists so no report can land on a stale count.
        self.site.barrier.reset(units);
        self.site.recorder.emit(EventKind::FloorStarted { floor });
        info!(units, "floor started");

        let mut handles = Vec::new();
        let mut spawn_error = None;
        for local in 0..units {
            let Some(id) = unit_id(floor, local, units) else {
                spawn_error = Some(Error::Config(ConfigError::TooManyUnits {
                    floors: self.config.floors,
                    units_per_floor: units,
                }));
                break;
            };
            let task = task_for(id, &self.config.tasks).unwrap_or_default();
            let worker = UnitWorker::new(id, floor, task, self.site.clone());
            match thread::Builder::new()
                .name(format!("unit-{id}"))
                .spawn(move || worker.run())
            {
                Ok(handle) => handles.push((id, handle)),
                Err(source) => {
                    spawn_error = Some(Error::Spawn {
                        what: format!("unit {id}"),
                        source,
                    });
                    break;
                }
            }
        }

        let joined = join_units(handles);
        if let Some(err) = spawn_error {
            return Err(err);
        }
        joined?;

        let done = self.site.barrier.await_floor_complete();
        debug_assert_eq!(done, units, "barrier count diverged from floor size");
        self.advance(OrchestratorState::FloorComplete(floor));
        self.site.recorder.emit(EventKind::FloorFinished { floor });
        info!("floor finished");
        Ok(())
    }
}

/// Join every unit of a floor; the first failure wins but all are joined.
fn join_units(handles: Vec<(UnitId, thread::JoinHandle<Result<()>>)>) -> Result<()> {
    let mut first_error = None;
    for (unit, handle) in handles {
        let outcome = match handle.join() {
            Ok(result) => result,
            Err(_) => Err(Error::UnitPanicked { unit }),
        };
        if let Err(err) = outcome {
            warn!(unit, error = %err, "unit failed");
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn lay_foundation(
    latch: &Arc<FoundationLatch>,
    recorder: &Arc<Recorder>,
    config: &BuildingConfig,
) -> Result<thread::JoinHandle<()>> {
    let latch = Arc::clone(latch);
    let recorder = Arc::clone(recorder);
    let duration = config.foundation_duration();
    thread::Builder::new()
        .name("foundation".to_string())
        .spawn(move || {
            let guard = LatchGuard::new(&latch);
            info!(ms = duration.as_millis() as u64, "laying foundation");
            if !duration.is_zero() {
                thread::sleep(duration);
            }
            recorder.emit(EventKind::FoundationLaid);
            guard.complete();
        })
        .map_err(|source| Error::Spawn {
            what: "foundation".to_string(),
            source,
        })
}

/// Erect the whole building and return the collected event stream.
pub fn run(config: &BuildingConfig) -> Result<BuildReport> {
    run_with_sink(config, NullSink)
}

/// Like [`run`], additionally streaming each event to `sink` as it happens.
pub fn run_with_sink<S>(config: &BuildingConfig, sink: S) -> Result<BuildReport>
where
    S: EventSink + 'static,
{
    config.validate()?;
    let pool = Arc::new(ResourcePool::new(&config.capacity)?);
    let recorder = Arc::new(Recorder::new(Box::new(sink)));
    let foundation = Arc::new(FoundationLatch::new());

    let foundation_handle = lay_foundation(&foundation, &recorder, config)?;

    let mut orchestrator = Orchestrator {
        config,
        state: OrchestratorState::Idle,
        site: Site {
            pool: Arc::clone(&pool),
            barrier: Arc::new(FloorBarrier::new()),
            recorder: Arc::clone(&recorder),
            work: config.stage_duration(),
        },
        foundation,
    };

    let mut floors_completed = 0;
    let mut outcome = Ok(());
    for floor in 0..config.floors {
        if let Err(err) = orchestrator.build_floor(floor) {
            outcome = Err(err);
            break;
        }
        floors_completed += 1;
    }
    if foundation_handle.join().is_err() {
        warn!("foundation thread panicked");
    }
    outcome?;

    orchestrator.advance(OrchestratorState::Done);
    let peak_holders = pool.peaks();
    let forced = pool.release_all();
    debug_assert_eq!(forced, 0, "resources still held after the last floor");
    info!(floors = floors_completed, "building complete");

    Ok(BuildReport {
        events: recorder.take_events(),
        floors_completed,
        peak_holders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrchestratorState::*;

    #[test]
    fn floors_advance_strictly_in_sequence() {
        assert!(Idle.can_advance_to(FloorInProgress(0)));
        assert!(!Idle.can_advance_to(FloorInProgress(1)));
        assert!(FloorInProgress(2).can_advance_to(FloorComplete(2)));
        assert!(!FloorInProgress(2).can_advance_to(FloorComplete(3)));
        assert!(FloorComplete(2).can_advance_to(FloorInProgress(3)));
        assert!(!FloorComplete(2).can_advance_to(FloorInProgress(2)));
        assert!(!FloorInProgress(0).can_advance_to(FloorInProgress(1)));
        assert!(FloorComplete(4).can_advance_to(Done));
        assert!(!FloorInProgress(4).can_advance_to(Done));
        assert!(!Done.can_advance_to(FloorInProgress(0)));
    }

    #[test]
    fn zero_units_is_rejected_without_spawning() {
        let config = BuildingConfig {
            units_per_floor: 0,
            ..BuildingConfig::default()
        };
        let err = run(&config).expect_err("zero units");
        assert!(err.is_config());
    }

    #[test]
    fn join_units_joins_everyone_and_keeps_first_error() {
        use crate::types::Resource;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Duration;

        let slow_finished = Arc::new(AtomicBool::new(false));
        let failing = thread::spawn(|| {
            Err(Error::InvalidRelease {
                resource: Resource::Water,
                unit: 1,
            })
        });
        let slow = {
            let slow_finished = Arc::clone(&slow_finished);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                slow_finished.store(true, Ordering::SeqCst);
                Ok(())
            })
        };
        let crashed = thread::spawn(|| -> Result<()> { panic!("unit 3 crashed") });

        let err = join_units(vec![(1, failing), (2, slow), (3, crashed)])
            .expect_err("first failure");
        assert!(matches!(
            err,
            Error::InvalidRelease {
                resource: Resource::Water,
                unit: 1
            }
        ));
        assert!(slow_finished.load(Ordering::SeqCst));
    }

    #[test]
    fn panicked_unit_is_reported_by_id() {
        let crashed = thread::spawn(|| -> Result<()> { panic!("unit 7 crashed") });
        let err = join_units(vec![(7, crashed)]).expect_err("panic");
        assert!(matches!(err, Error::UnitPanicked { unit: 7 }));
    }
}
