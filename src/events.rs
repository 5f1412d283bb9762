//! Construction event stream with logical timestamps.

use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::types::{FloorId, Stage, UnitId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    FoundationLaid,
    FloorStarted {
        floor: FloorId,
    },
    FloorFinished {
        floor: FloorId,
    },
    UnitAssigned {
        floor: FloorId,
        unit: UnitId,
        task: String,
    },
    UnitStageStarted {
        floor: FloorId,
        unit: UnitId,
        stage: Stage,
    },
    UnitStageFinished {
        floor: FloorId,
        unit: UnitId,
        stage: Stage,
    },
}

/// A stamped event. `seq` is the logical clock: gap-free and strictly
/// increasing in stream order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Event {
    pub seq: u64,
    /// Wall time since the run started.
    pub elapsed: Duration,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Receives events live, in `seq` order, while a run is in progress.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &Event);
}

/// Sink that drops everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &Event) {}
}

impl<F> EventSink for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn record(&self, event: &Event) {
        self(event)
    }
}

/// Forwards clones to a channel; a hung-up receiver is ignored.
pub struct ChannelSink(Mutex<mpsc::Sender<Event>>);

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self(Mutex::new(sender))
    }
}

impl EventSink for ChannelSink {
    fn record(&self, event: &Event) {
        let sender = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = sender.send(event.clone());
    }
}

struct Timeline {
    next_seq: u64,
    events: Vec<Event>,
}

/// Stamps, stores and forwards events. Stamping and delivery happen under
/// one lock so sink order always equals `seq` order.
pub struct Recorder {
    start: Instant,
    timeline: Mutex<Timeline>,
    sink: Box<dyn EventSink>,
}

impl Recorder {
    pub fn new(sink: Box<dyn EventSink>) -> Self {
        Self {
            start: Instant::now(),
            timeline: Mutex::new(Timeline {
                next_seq: 0,
                events: Vec::new(),
            }),
            sink,
        }
    }

    pub fn emit(&self, kind: EventKind) -> u64 {
        let mut timeline = self.timeline.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = timeline.next_seq;
        timeline.next_seq += 1;
        let event = Event {
            seq,
            elapsed: self.start.elapsed(),
            kind,
        };
        self.sink.record(&event);
        timeline.events.push(event);
        seq
    }

    pub fn stage_started(&self, floor: FloorId, unit: UnitId, stage: Stage) -> u64 {
        self.emit(EventKind::UnitStageStarted { floor, unit, stage })
    }

    pub fn stage_finished(&self, floor: FloorId, unit: UnitId, stage: Stage) -> u64 {
        self.emit(EventKind::UnitStageFinished { floor, unit, stage })
    }

    /// Drain everything recorded so far.
    pub fn take_events(&self) -> Vec<Event> {
        let mut timeline = self.timeline.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut timeline.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;

    #[test]
    fn seq_is_gap_free_across_threads() {
        let recorder = Arc::new(Recorder::new(Box::new(NullSink)));
        let handles: Vec<_> = (1..=4)
            .map(|unit| {
                let recorder = Arc::clone(&recorder);
                thread::spawn(move || {
                    for stage in Stage::PIPELINE {
                        recorder.stage_started(0, unit, stage);
                        recorder.stage_finished(0, unit, stage);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("emitter panicked");
        }

        let events = recorder.take_events();
        assert_eq!(events.len(), 40);
        for (index, event) in events.iter().enumerate() {
            assert_eq!(event.seq, index as u64);
        }
    }

    #[test]
    fn sinks_see_events_in_seq_order() {
        let last = Arc::new(AtomicU64::new(u64::MAX));
        let seen = Arc::clone(&last);
        let recorder = Recorder::new(Box::new(move |event: &Event| {
            let prev = seen.swap(event.seq, Ordering::SeqCst);
            assert!(prev == u64::MAX || prev + 1 == event.seq);
        }));
        recorder.emit(EventKind::FoundationLaid);
        recorder.emit(EventKind::FloorStarted { floor: 0 });
        assert_eq!(last.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn channel_sink_forwards_clones() {
        let (tx, rx) = mpsc::channel();
        let recorder = Recorder::new(Box::new(ChannelSink::new(tx)));
        recorder.emit(EventKind::FloorStarted { floor: 2 });
        let event = rx.try_recv().expect("forwarded event");
        assert_eq!(event.kind, EventKind::FloorStarted { floor: 2 });
        assert_eq!(recorder.take_events().len(), 1);
    }

    #[test]
    fn events_serialize_flat() {
        let event = Event {
            seq: 3,
            elapsed: Duration::from_millis(5),
            kind: EventKind::UnitStageStarted {
                floor: 0,
                unit: 1,
                stage: Stage::Electrical,
            },
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "unit_stage_started");
        assert_eq!(json["stage"], "electrical");
        assert_eq!(json["seq"], 3);
    }
}
