//! Id-keyed entity arena.
//!
//! All incidents, vehicles, facilities, and dispatch records live here,
//! behind one `RwLock`. Mutation happens only through the coordinator;
//! critical sections are short and synchronous, and nothing awaits while
//! a guard is held. The maps from vehicle id and incident id to their
//! active dispatch are derived indexes kept in step with every mutation,
//! standing in for back-references so no ownership cycle exists.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use es_locator_models::{Dispatch, Facility, Incident, Vehicle};
use uuid::Uuid;

pub(crate) struct Entities {
    pub(crate) facilities: BTreeMap<i64, Facility>,
    pub(crate) vehicles: BTreeMap<i64, Vehicle>,
    pub(crate) incidents: BTreeMap<i64, Incident>,
    pub(crate) dispatches: BTreeMap<Uuid, Dispatch>,
    /// Derived: vehicle id → its active dispatch.
    pub(crate) active_by_vehicle: BTreeMap<i64, Uuid>,
    /// Derived: incident id → its active dispatch.
    pub(crate) active_by_incident: BTreeMap<i64, Uuid>,
    next_facility: i64,
    next_vehicle: i64,
    next_incident: i64,
}

impl Entities {
    pub(crate) fn allocate_facility_id(&mut self) -> i64 {
        let id = self.next_facility;
        self.next_facility += 1;
        id
    }

    pub(crate) fn allocate_vehicle_id(&mut self) -> i64 {
        let id = self.next_vehicle;
        self.next_vehicle += 1;
        id
    }

    pub(crate) fn allocate_incident_id(&mut self) -> i64 {
        let id = self.next_incident;
        self.next_incident += 1;
        id
    }
}

/// Shared arena of domain entities.
pub struct EntityStore {
    inner: RwLock<Entities>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Entities {
                facilities: BTreeMap::new(),
                vehicles: BTreeMap::new(),
                incidents: BTreeMap::new(),
                dispatches: BTreeMap::new(),
                active_by_vehicle: BTreeMap::new(),
                active_by_incident: BTreeMap::new(),
                next_facility: 1,
                next_vehicle: 1,
                next_incident: 1,
            }),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Entities> {
        self.inner.read().expect("entity store lock poisoned")
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Entities> {
        self.inner.write().expect("entity store lock poisoned")
    }
}
