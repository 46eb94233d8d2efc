#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the emergency services locator
//! server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the domain types to allow independent evolution of the API
//! contract.

use chrono::{DateTime, Utc};
use es_locator_dispatch::{FacilityView, IncidentView, VehicleView};
use es_locator_models::{
    Dispatch, DispatchStatus, FacilityCategory, IncidentSeverity, IncidentStatus, IncidentType,
    RouteSummary, VehicleStatus, VehicleType,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A route summary as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRouteSummary {
    /// Route length in meters.
    pub distance_m: f64,
    /// Expected travel time in seconds.
    pub duration_s: f64,
    /// Route geometry as `[lon, lat]` pairs.
    pub path: Vec<[f64; 2]>,
    /// Whether this is a straight-line estimate rather than a routed
    /// result.
    pub estimated: bool,
}

impl From<RouteSummary> for ApiRouteSummary {
    fn from(summary: RouteSummary) -> Self {
        Self {
            distance_m: summary.distance_m,
            duration_s: summary.duration_s,
            path: summary.path,
            estimated: summary.estimated,
        }
    }
}

/// An incident as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiIncident {
    /// Unique incident id.
    pub id: i64,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Incident kind.
    pub incident_type: IncidentType,
    /// Severity level.
    pub severity: IncidentSeverity,
    /// Lifecycle status.
    pub status: IncidentStatus,
    /// Longitude.
    pub longitude: Option<f64>,
    /// Latitude.
    pub latitude: Option<f64>,
    /// Street address, if reported.
    pub address: Option<String>,
    /// When the incident was reported (ISO 8601).
    pub reported_at: DateTime<Utc>,
    /// When a vehicle was first assigned.
    pub dispatched_at: Option<DateTime<Utc>>,
    /// When the incident reached a terminal state.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Currently assigned vehicle id.
    pub assigned_vehicle: Option<i64>,
    /// Route summary for the active assignment.
    pub route: Option<ApiRouteSummary>,
    /// Id of the active dispatch record, if any.
    pub active_dispatch: Option<Uuid>,
}

impl From<IncidentView> for ApiIncident {
    fn from(view: IncidentView) -> Self {
        let incident = view.incident;
        Self {
            id: incident.id,
            title: incident.title,
            description: incident.description,
            incident_type: incident.incident_type,
            severity: incident.severity,
            status: incident.status,
            longitude: view.lonlat.map(|p| p[0]),
            latitude: view.lonlat.map(|p| p[1]),
            address: incident.address,
            reported_at: incident.reported_at,
            dispatched_at: incident.dispatched_at,
            resolved_at: incident.resolved_at,
            assigned_vehicle: incident.assigned_vehicle,
            route: incident.route.map(ApiRouteSummary::from),
            active_dispatch: view.active_dispatch,
        }
    }
}

/// A vehicle as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiVehicle {
    /// Unique vehicle id.
    pub id: i64,
    /// Radio call sign.
    pub call_sign: String,
    /// Vehicle type.
    pub vehicle_type: VehicleType,
    /// Operational status.
    pub status: VehicleStatus,
    /// Longitude.
    pub longitude: Option<f64>,
    /// Latitude.
    pub latitude: Option<f64>,
    /// Heading in degrees.
    pub heading_deg: f64,
    /// Speed in km/h.
    pub speed_kmh: f64,
    /// Facility id of the home base.
    pub home_facility: Option<i64>,
    /// Id of the active dispatch record, if any.
    pub active_dispatch: Option<Uuid>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<VehicleView> for ApiVehicle {
    fn from(view: VehicleView) -> Self {
        let vehicle = view.vehicle;
        Self {
            id: vehicle.id,
            call_sign: vehicle.call_sign,
            vehicle_type: vehicle.vehicle_type,
            status: vehicle.status,
            longitude: view.lonlat.map(|p| p[0]),
            latitude: view.lonlat.map(|p| p[1]),
            heading_deg: vehicle.heading_deg,
            speed_kmh: vehicle.speed_kmh,
            home_facility: vehicle.home_facility,
            active_dispatch: view.active_dispatch,
            updated_at: vehicle.updated_at,
        }
    }
}

/// A facility as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFacility {
    /// Unique facility id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Facility category.
    pub category: FacilityCategory,
    /// Street address.
    pub address: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Longitude.
    pub longitude: Option<f64>,
    /// Latitude.
    pub latitude: Option<f64>,
}

impl From<FacilityView> for ApiFacility {
    fn from(view: FacilityView) -> Self {
        let facility = view.facility;
        Self {
            id: facility.id,
            name: facility.name,
            category: facility.category,
            address: facility.address,
            phone: facility.phone,
            longitude: view.lonlat.map(|p| p[0]),
            latitude: view.lonlat.map(|p| p[1]),
        }
    }
}

/// A dispatch record as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDispatch {
    /// Unique dispatch id.
    pub id: Uuid,
    /// Incident served by this dispatch.
    pub incident_id: i64,
    /// Assigned vehicle.
    pub vehicle_id: i64,
    /// Progress status.
    pub status: DispatchStatus,
    /// When the assignment was committed.
    pub created_at: DateTime<Utc>,
    /// When the vehicle went en route.
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// When the vehicle arrived on scene.
    pub arrived_at: Option<DateTime<Utc>>,
    /// When the record was closed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Route summary computed at assignment time.
    pub route: Option<ApiRouteSummary>,
}

impl From<Dispatch> for ApiDispatch {
    fn from(dispatch: Dispatch) -> Self {
        Self {
            id: dispatch.id,
            incident_id: dispatch.incident_id,
            vehicle_id: dispatch.vehicle_id,
            status: dispatch.status,
            created_at: dispatch.created_at,
            acknowledged_at: dispatch.acknowledged_at,
            arrived_at: dispatch.arrived_at,
            completed_at: dispatch.completed_at,
            route: dispatch.route.map(ApiRouteSummary::from),
        }
    }
}

/// An administrative boundary as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBoundary {
    /// Boundary id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Name in the local language.
    pub local_name: Option<String>,
    /// Original source identifier.
    pub source_ref: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// Request body for creating an incident.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIncidentRequest {
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Incident kind.
    pub incident_type: IncidentType,
    /// Severity level.
    pub severity: IncidentSeverity,
    /// Street address.
    pub address: Option<String>,
    /// Longitude.
    pub lon: f64,
    /// Latitude.
    pub lat: f64,
}

/// Request body for dispatching a vehicle to an incident.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    /// Explicit vehicle to assign; omitted for automatic selection.
    pub vehicle_id: Option<i64>,
}

/// Request body for an incident status update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    /// Target lifecycle status.
    pub status: IncidentStatus,
}

/// Request body for a vehicle position update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleLocationUpdate {
    /// Longitude.
    pub longitude: f64,
    /// Latitude.
    pub latitude: f64,
    /// Heading in degrees, if reported.
    pub heading_deg: Option<f64>,
    /// Speed in km/h, if reported.
    pub speed_kmh: Option<f64>,
}

/// Query parameters for the nearest-facilities endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestQueryParams {
    /// Latitude of the query point.
    pub lat: f64,
    /// Longitude of the query point.
    pub lon: f64,
    /// Number of results, clamped server-side.
    pub limit: Option<usize>,
    /// Facility category filter.
    #[serde(rename = "type")]
    pub category: Option<FacilityCategory>,
}

/// Query parameters for the within-radius endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadiusQueryParams {
    /// Latitude of the center point.
    pub lat: f64,
    /// Longitude of the center point.
    pub lon: f64,
    /// Radius in meters.
    #[serde(rename = "radius_m")]
    pub radius_m: f64,
    /// Facility category filter.
    #[serde(rename = "type")]
    pub category: Option<FacilityCategory>,
}

/// Request body for the within-polygon endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonRequest {
    /// GeoJSON geometry; must be a polygon.
    pub geometry: geojson::Geometry,
    /// Facility category filter.
    #[serde(rename = "type")]
    pub category: Option<FacilityCategory>,
}

/// Query parameters for the within-boundary endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryQueryParams {
    /// Boundary id.
    pub id: Option<i64>,
    /// Boundary name, matched case-insensitively.
    pub name: Option<String>,
    /// Facility category filter.
    #[serde(rename = "type")]
    pub category: Option<FacilityCategory>,
}

/// Query parameters for the boundary-containing endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainingQueryParams {
    /// Latitude of the query point.
    pub lat: f64,
    /// Longitude of the query point.
    pub lon: f64,
}

/// Query parameters for listing facilities.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityQueryParams {
    /// Facility category filter.
    #[serde(rename = "type")]
    pub category: Option<FacilityCategory>,
}

/// Query parameters for the incident polling endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentQueryParams {
    /// Lifecycle status filter.
    pub status: Option<IncidentStatus>,
    /// Incident type filter.
    #[serde(rename = "type")]
    pub incident_type: Option<IncidentType>,
    /// Minimum severity filter.
    pub severity_min: Option<IncidentSeverity>,
    /// Only non-terminal incidents.
    pub active: Option<bool>,
}

/// Query parameters for the vehicle polling endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleQueryParams {
    /// Operational status filter.
    pub status: Option<VehicleStatus>,
    /// Vehicle type filter.
    #[serde(rename = "type")]
    pub vehicle_type: Option<VehicleType>,
}

/// Query parameters for the route preview endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePreviewParams {
    /// Candidate vehicle id.
    #[serde(rename = "vehicle_id")]
    pub vehicle_id: i64,
}
