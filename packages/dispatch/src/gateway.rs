//! Read-only snapshot views for polling observers.
//!
//! Observers (dashboards, simulation harnesses) poll on a fixed interval
//! rather than receiving pushes. The gateway clones entity state under a
//! short read lock and resolves positions afterwards, so pollers never
//! hold a lock shared with writers for longer than the copy itself.

use std::sync::Arc;

use es_locator_models::{
    Dispatch, Facility, Incident, IncidentSeverity, IncidentStatus, IncidentType, Vehicle,
    VehicleStatus, VehicleType,
};
use uuid::Uuid;

use es_locator_geometry::GeometryStore;

use crate::store::EntityStore;

/// Filters for the incident snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncidentFilter {
    /// Only incidents in this status.
    pub status: Option<IncidentStatus>,
    /// Only incidents of this type.
    pub incident_type: Option<IncidentType>,
    /// Only incidents at or above this severity.
    pub min_severity: Option<IncidentSeverity>,
    /// Only non-terminal incidents.
    pub active_only: bool,
}

/// Filters for the vehicle snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct VehicleFilter {
    /// Only vehicles in this status.
    pub status: Option<VehicleStatus>,
    /// Only vehicles of this type.
    pub vehicle_type: Option<VehicleType>,
}

/// An incident with its resolved position and active dispatch.
#[derive(Debug, Clone)]
pub struct IncidentView {
    /// The incident record.
    pub incident: Incident,
    /// Position as `[lon, lat]`, when the location handle resolves.
    pub lonlat: Option<[f64; 2]>,
    /// Id of the active dispatch, if one exists.
    pub active_dispatch: Option<Uuid>,
}

/// A vehicle with its resolved position and active dispatch.
#[derive(Debug, Clone)]
pub struct VehicleView {
    /// The vehicle record.
    pub vehicle: Vehicle,
    /// Position as `[lon, lat]`, when the location handle resolves.
    pub lonlat: Option<[f64; 2]>,
    /// Id of the active dispatch, if one exists.
    pub active_dispatch: Option<Uuid>,
}

/// A facility with its resolved position.
#[derive(Debug, Clone)]
pub struct FacilityView {
    /// The facility record.
    pub facility: Facility,
    /// Position as `[lon, lat]`, when the location handle resolves.
    pub lonlat: Option<[f64; 2]>,
}

/// Pollable snapshot interface over the entity arena.
pub struct PollingGateway {
    entities: Arc<EntityStore>,
    geometry: Arc<GeometryStore>,
}

impl PollingGateway {
    /// Creates a gateway over the shared stores.
    #[must_use]
    pub const fn new(entities: Arc<EntityStore>, geometry: Arc<GeometryStore>) -> Self {
        Self { entities, geometry }
    }

    /// Snapshot of incidents matching `filter`, newest first.
    #[must_use]
    pub fn incidents(&self, filter: &IncidentFilter) -> Vec<IncidentView> {
        let snapshot: Vec<(Incident, Option<Uuid>)> = {
            let entities = self.entities.read();
            entities
                .incidents
                .values()
                .filter(|incident| {
                    filter.status.is_none_or(|s| incident.status == s)
                        && filter.incident_type.is_none_or(|t| incident.incident_type == t)
                        && filter.min_severity.is_none_or(|s| incident.severity >= s)
                        && (!filter.active_only || incident.status.is_active())
                })
                .map(|incident| {
                    (
                        incident.clone(),
                        entities.active_by_incident.get(&incident.id).copied(),
                    )
                })
                .collect()
        };

        let mut views: Vec<IncidentView> = snapshot
            .into_iter()
            .map(|(incident, active_dispatch)| IncidentView {
                lonlat: self
                    .geometry
                    .point(incident.location)
                    .map(|p| [p.x(), p.y()]),
                incident,
                active_dispatch,
            })
            .collect();
        views.sort_by(|a, b| b.incident.reported_at.cmp(&a.incident.reported_at));
        views
    }

    /// Snapshot of vehicles matching `filter`, ordered by call sign.
    #[must_use]
    pub fn vehicles(&self, filter: &VehicleFilter) -> Vec<VehicleView> {
        let snapshot: Vec<(Vehicle, Option<Uuid>)> = {
            let entities = self.entities.read();
            entities
                .vehicles
                .values()
                .filter(|vehicle| {
                    filter.status.is_none_or(|s| vehicle.status == s)
                        && filter.vehicle_type.is_none_or(|t| vehicle.vehicle_type == t)
                })
                .map(|vehicle| {
                    (
                        vehicle.clone(),
                        entities.active_by_vehicle.get(&vehicle.id).copied(),
                    )
                })
                .collect()
        };

        let mut views: Vec<VehicleView> = snapshot
            .into_iter()
            .map(|(vehicle, active_dispatch)| VehicleView {
                lonlat: self
                    .geometry
                    .point(vehicle.location)
                    .map(|p| [p.x(), p.y()]),
                vehicle,
                active_dispatch,
            })
            .collect();
        views.sort_by(|a, b| a.vehicle.call_sign.cmp(&b.vehicle.call_sign));
        views
    }

    /// Snapshot of all facilities, optionally one category.
    #[must_use]
    pub fn facilities(
        &self,
        category: Option<es_locator_models::FacilityCategory>,
    ) -> Vec<FacilityView> {
        let snapshot: Vec<Facility> = {
            let entities = self.entities.read();
            entities
                .facilities
                .values()
                .filter(|facility| category.is_none_or(|c| facility.category == c))
                .cloned()
                .collect()
        };

        snapshot
            .into_iter()
            .map(|facility| FacilityView {
                lonlat: self
                    .geometry
                    .point(facility.location)
                    .map(|p| [p.x(), p.y()]),
                facility,
            })
            .collect()
    }

    /// Single-incident view, if the id exists.
    #[must_use]
    pub fn incident(&self, id: i64) -> Option<IncidentView> {
        let (incident, active_dispatch) = {
            let entities = self.entities.read();
            let incident = entities.incidents.get(&id)?.clone();
            let active = entities.active_by_incident.get(&id).copied();
            (incident, active)
        };
        Some(IncidentView {
            lonlat: self
                .geometry
                .point(incident.location)
                .map(|p| [p.x(), p.y()]),
            incident,
            active_dispatch,
        })
    }

    /// Single-vehicle view, if the id exists.
    #[must_use]
    pub fn vehicle(&self, id: i64) -> Option<VehicleView> {
        let (vehicle, active_dispatch) = {
            let entities = self.entities.read();
            let vehicle = entities.vehicles.get(&id)?.clone();
            let active = entities.active_by_vehicle.get(&id).copied();
            (vehicle, active)
        };
        Some(VehicleView {
            lonlat: self
                .geometry
                .point(vehicle.location)
                .map(|p| [p.x(), p.y()]),
            vehicle,
            active_dispatch,
        })
    }

    /// Single-facility view, if the id exists.
    #[must_use]
    pub fn facility(&self, id: i64) -> Option<FacilityView> {
        let facility = self.entities.read().facilities.get(&id)?.clone();
        Some(FacilityView {
            lonlat: self
                .geometry
                .point(facility.location)
                .map(|p| [p.x(), p.y()]),
            facility,
        })
    }

    /// Snapshot of dispatch records, newest first; `active_only` keeps
    /// records still holding their vehicle.
    #[must_use]
    pub fn dispatches(&self, active_only: bool) -> Vec<Dispatch> {
        let entities = self.entities.read();
        let mut records: Vec<Dispatch> = entities
            .dispatches
            .values()
            .filter(|dispatch| !active_only || dispatch.status.is_active())
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }
}
