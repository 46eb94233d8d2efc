#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident lifecycle and vehicle dispatch coordination.
//!
//! [`coordinator::DispatchCoordinator`] is the single mutation path for
//! incidents, vehicles, and dispatch records, which live in an id-keyed
//! arena ([`store::EntityStore`]). Assignment runs in three phases —
//! plan under a read lock, route with no locks held, commit under a
//! write lock with status re-checks — so a slow routing collaborator
//! never blocks the arena and two concurrent dispatch requests can never
//! both claim the same vehicle or incident.
//! [`gateway::PollingGateway`] gives observers a read-only snapshot view.

pub mod coordinator;
pub mod gateway;
pub mod store;

pub use coordinator::DispatchCoordinator;
pub use gateway::{
    FacilityView, IncidentFilter, IncidentView, PollingGateway, VehicleFilter, VehicleView,
};
pub use store::EntityStore;

use es_locator_geometry::{GeoError, QueryLimits};
use es_locator_models::{
    FacilityCategory, IncidentSeverity, IncidentStatus, IncidentType, VehicleType,
};
use es_locator_routing::{RouteProfile, RoutingError};

/// Errors from dispatch coordination.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Unknown incident, vehicle, or facility id.
    #[error("{what} not found: {id}")]
    NotFound {
        /// What kind of entity was looked up.
        what: &'static str,
        /// The id that failed to resolve.
        id: i64,
    },

    /// Illegal incident lifecycle transition; state is unchanged.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: IncidentStatus,
        /// Rejected target status.
        to: IncidentStatus,
    },

    /// Lost an assignment race: the incident or every candidate vehicle
    /// was claimed by a concurrent request.
    #[error("already assigned: {message}")]
    AlreadyAssigned {
        /// What was contended.
        message: String,
    },

    /// No vehicle is available to dispatch.
    #[error("no dispatchable vehicle available")]
    NoCandidates,

    /// Geometry validation or lookup failure.
    #[error(transparent)]
    Geometry(#[from] GeoError),

    /// Routing collaborator failure on a path that does not degrade
    /// (route preview).
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// Tunables for the dispatch coordinator.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// How many candidate vehicles get a route request during automatic
    /// selection. Bounds external-call cost; the right value depends on
    /// deployment density.
    pub shortlist_size: usize,
    /// Routing profile requested from the collaborator.
    pub profile: RouteProfile,
    /// Limits applied to the coordinator's own spatial queries.
    pub query_limits: QueryLimits,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            shortlist_size: 3,
            profile: RouteProfile::Driving,
            query_limits: QueryLimits::default(),
        }
    }
}

/// Input for registering a facility.
#[derive(Debug, Clone)]
pub struct NewFacility {
    /// Display name.
    pub name: String,
    /// Facility category.
    pub category: FacilityCategory,
    /// Street address, if known.
    pub address: Option<String>,
    /// Contact phone, if known.
    pub phone: Option<String>,
    /// Longitude (WGS84).
    pub lon: f64,
    /// Latitude (WGS84).
    pub lat: f64,
}

/// Input for registering a vehicle.
#[derive(Debug, Clone)]
pub struct NewVehicle {
    /// Radio call sign.
    pub call_sign: String,
    /// Vehicle type.
    pub vehicle_type: VehicleType,
    /// Facility id of the home base, if any.
    pub home_facility: Option<i64>,
    /// Longitude (WGS84).
    pub lon: f64,
    /// Latitude (WGS84).
    pub lat: f64,
}

/// Input for reporting an incident.
#[derive(Debug, Clone)]
pub struct NewIncident {
    /// Short human-readable title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Incident kind.
    pub incident_type: IncidentType,
    /// Severity level.
    pub severity: IncidentSeverity,
    /// Street address, if reported.
    pub address: Option<String>,
    /// Longitude (WGS84).
    pub lon: f64,
    /// Latitude (WGS84).
    pub lat: f64,
}
