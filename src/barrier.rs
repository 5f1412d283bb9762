//! Floor completion barrier and the one-shot foundation latch.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::types::UnitId;

struct FloorCount {
    done: u64,
    target: u64,
}

/// Counts unit completions for the active floor and releases the single
/// orchestrator waiter once every unit has reported.
///
/// Owned by the orchestrator and reset explicitly before each floor is spawned.
/// Double-reporting by a unit is not defended against; it only logs.
pub struct FloorBarrier {
    count: Mutex<FloorCount>,
    complete: Condvar,
}

impl FloorBarrier {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(FloorCount { done: 0, target: 0 }),
            complete: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FloorCount> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Zero the counter and arm it for `target` reports.
    ///
    /// Must only be called once the previous floor's units have terminated.
    pub fn reset(&self, target: u64) {
        let mut guard = self.lock();
        debug_assert!(
            guard.done == guard.target,
            "barrier reset with floor still in progress: {}/{}",
            guard.done,
            guard.target
        );
        guard.done = 0;
        guard.target = target;
    }

    /// Record one unit's completion; returns the count after this report.
    pub fn report_done(&self, unit: UnitId) -> u64 {
        let mut guard = self.lock();
        guard.done += 1;
        if guard.done == guard.target {
            self.complete.notify_one();
        } else if guard.done > guard.target {
            warn!(unit, done = guard.done, target = guard.target, "barrier over-reported");
        }
        guard.done
    }

    /// Block until the current floor's counter reaches its target.
    pub fn await_floor_complete(&self) -> u64 {
        let mut guard = self.lock();
        while guard.done < guard.target {
            guard = self
                .complete
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        guard.done
    }

    /// Current completion count.
    pub fn completed(&self) -> u64 {
        self.lock().done
    }
}

impl Default for FloorBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Footing {
    Pending,
    Laid,
    Abandoned,
}

/// One-time gate: closed until the foundation is laid (or abandoned), then
/// never blocks again.
pub struct FoundationLatch {
    footing: Mutex<Footing>,
    opened: Condvar,
}

impl FoundationLatch {
    pub fn new() -> Self {
        Self {
            footing: Mutex::new(Footing::Pending),
            opened: Condvar::new(),
        }
    }

    fn settle(&self, outcome: Footing) -> bool {
        let mut footing = self.footing.lock().unwrap_or_else(PoisonError::into_inner);
        let first = *footing == Footing::Pending;
        if first {
            *footing = outcome;
        }
        self.opened.notify_all();
        first
    }

    /// Open the latch; returns false if it was already settled.
    pub fn open(&self) -> bool {
        self.settle(Footing::Laid)
    }

    /// Release waiters without a foundation; they see `wait() == false`.
    pub fn abandon(&self) -> bool {
        self.settle(Footing::Abandoned)
    }

    /// Block until the latch settles; true when the foundation was laid.
    pub fn wait(&self) -> bool {
        let mut footing = self.footing.lock().unwrap_or_else(PoisonError::into_inner);
        while *footing == Footing::Pending {
            footing = self
                .opened
                .wait(footing)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *footing == Footing::Laid
    }

    pub fn is_open(&self) -> bool {
        *self.footing.lock().unwrap_or_else(PoisonError::into_inner) == Footing::Laid
    }
}

impl Default for FoundationLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Abandons the latch on drop unless `complete` ran, so a foundation thread
/// that unwinds still releases the orchestrator.
pub struct LatchGuard<'a> {
    latch: &'a FoundationLatch,
    completed: bool,
}

impl<'a> LatchGuard<'a> {
    pub fn new(latch: &'a FoundationLatch) -> Self {
        Self {
            latch,
            completed: false,
        }
    }

    pub fn complete(mut self) {
        self.completed = true;
        self.latch.open();
    }
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.latch.abandon();
        }
    }
}
