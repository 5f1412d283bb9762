//! Capacity-limited shared resources (crane, electricity, water).

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::config::Capacities;
use crate::error::{ConfigError, Error, Result};
use crate::types::{Resource, UnitId};

struct GateState {
    holders: HashSet<UnitId>,
    peak: usize,
}

/// One counted resource: at most `capacity` distinct units hold it at once.
struct Gate {
    resource: Resource,
    capacity: usize,
    state: Mutex<GateState>,
    available: Condvar,
}

impl Gate {
    fn new(resource: Resource, capacity: usize) -> Self {
        Self {
            resource,
            capacity,
            state: Mutex::new(GateState {
                holders: HashSet::with_capacity(capacity),
                peak: 0,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, unit: UnitId) -> Result<()> {
        let mut guard = self.lock();
        if guard.holders.contains(&unit) {
            return Err(Error::ReentrantAcquire {
                resource: self.resource,
                unit,
            });
        }
        while guard.holders.len() >= self.capacity {
            // Wait releases the lock and re-acquires it before returning.
            guard = self
                .available
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        guard.holders.insert(unit);
        guard.peak = guard.peak.max(guard.holders.len());
        debug!(
            resource = %self.resource,
            unit,
            held = guard.holders.len(),
            capacity = self.capacity,
            "acquired"
        );
        Ok(())
    }

    fn release(&self, unit: UnitId) -> Result<()> {
        let mut guard = self.lock();
        if !guard.holders.remove(&unit) {
            return Err(Error::InvalidRelease {
                resource: self.resource,
                unit,
            });
        }
        debug!(resource = %self.resource, unit, held = guard.holders.len(), "released");
        self.available.notify_one();
        Ok(())
    }
}

/// The shared pool every unit of every floor contends on.
pub struct ResourcePool {
    gates: [Gate; 3],
}

impl ResourcePool {
    /// Build a pool; a zero capacity is rejected since no unit could ever pass it.
    pub fn new(capacities: &Capacities) -> Result<Self> {
        for resource in Resource::ALL {
            if capacities.of(resource) == 0 {
                return Err(ConfigError::ZeroCapacity(resource).into());
            }
        }
        Ok(Self {
            gates: Resource::ALL.map(|resource| Gate::new(resource, capacities.of(resource))),
        })
    }

    fn gate(&self, resource: Resource) -> &Gate {
        &self.gates[resource.index()]
    }

    /// Block until `resource` has spare capacity, then take one slot for `unit`.
    ///
    /// The slot is returned when the [`Hold`] is released or dropped, so a
    /// unit that unwinds mid-stage never strands other waiters.
    pub fn acquire(&self, resource: Resource, unit: UnitId) -> Result<Hold<'_>> {
        let gate = self.gate(resource);
        gate.acquire(unit)?;
        Ok(Hold {
            gate,
            unit,
            released: false,
        })
    }

    /// Return `unit`'s slot and wake one waiter. Errors if `unit` holds none.
    pub fn release(&self, resource: Resource, unit: UnitId) -> Result<()> {
        self.gate(resource).release(unit)
    }

    pub fn capacity(&self, resource: Resource) -> usize {
        self.gate(resource).capacity
    }

    /// Units currently holding `resource`.
    pub fn holders(&self, resource: Resource) -> HashSet<UnitId> {
        self.gate(resource).lock().holders.clone()
    }

    /// Highest number of simultaneous holders seen so far.
    pub fn peak_holders(&self, resource: Resource) -> usize {
        self.gate(resource).lock().peak
    }

    pub fn peaks(&self) -> Capacities {
        Capacities {
            crane: self.peak_holders(Resource::Crane),
            electricity: self.peak_holders(Resource::Electricity),
            water: self.peak_holders(Resource::Water),
        }
    }

    /// Shutdown step: drop every outstanding hold and wake all waiters.
    /// Returns how many holds had to be force-released.
    pub fn release_all(&self) -> usize {
        let mut forced = 0;
        for gate in &self.gates {
            let mut guard = gate.lock();
            if !guard.holders.is_empty() {
                warn!(
                    resource = %gate.resource,
                    holders = ?guard.holders,
                    "force-releasing holds at shutdown"
                );
                forced += guard.holders.len();
                guard.holders.clear();
            }
            gate.available.notify_all();
        }
        forced
    }
}

/// One unit's slot in a resource.
#[must_use = "hold is released as soon as it is dropped"]
pub struct Hold<'a> {
    gate: &'a Gate,
    unit: UnitId,
    released: bool,
}

impl Hold<'_> {
    pub fn resource(&self) -> Resource {
        self.gate.resource
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Return the slot, surfacing an invalid release instead of swallowing it.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.gate.release(self.unit)
    }

    /// Keep the slot occupied without releasing it.
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl Drop for Hold<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.gate.release(self.unit) {
            warn!(error = %err, "hold dropped after its slot was already gone");
        }
    }
}
