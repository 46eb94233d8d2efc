#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Domain model types for the emergency services locator.
//!
//! This crate defines the canonical entity and status vocabulary used
//! across the entire system: facilities, response vehicles, incidents, and
//! dispatch records, plus the incident lifecycle rules. All other crates
//! build on these types; this crate depends on nothing geospatial so it
//! stays a leaf.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Opaque handle to a geometry value owned by the geometry store.
///
/// Entities never embed coordinates directly; they hold a `LocationId`
/// and resolve it through the store when a position is needed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LocationId(pub u64);

impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loc-{}", self.0)
    }
}

/// Category of an emergency service facility.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FacilityCategory {
    /// Hospital with emergency department.
    Hospital,
    /// Fire brigade station.
    FireStation,
    /// Police station.
    PoliceStation,
    /// Ambulance staging base.
    AmbulanceBase,
}

/// Type of a response vehicle.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VehicleType {
    /// Road ambulance.
    Ambulance,
    /// Fire engine / pumper.
    FireEngine,
    /// Police patrol car.
    PoliceCar,
    /// Air ambulance / rescue helicopter.
    Helicopter,
}

/// Operational status of a response vehicle.
///
/// A vehicle is a legal dispatch target only while `Available`. Every
/// other status means the vehicle is either working an incident or out of
/// service, and exactly one active [`Dispatch`] may reference it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VehicleStatus {
    /// Ready to be assigned.
    Available,
    /// Assigned to an incident, not yet moving.
    Dispatched,
    /// Driving to the incident.
    EnRoute,
    /// Working the incident scene.
    OnScene,
    /// Returning to base after completion.
    Returning,
    /// Out of service.
    Maintenance,
}

/// Kind of emergency incident.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentType {
    /// Structure or wildland fire.
    Fire,
    /// Medical emergency.
    Medical,
    /// Crime in progress / police matter.
    Crime,
    /// Traffic accident.
    Accident,
}

impl IncidentType {
    /// The vehicle type preferred when auto-selecting a response vehicle.
    ///
    /// `None` means any available vehicle type is acceptable.
    #[must_use]
    pub const fn preferred_vehicle(self) -> Option<VehicleType> {
        match self {
            Self::Fire => Some(VehicleType::FireEngine),
            Self::Medical => Some(VehicleType::Ambulance),
            Self::Crime => Some(VehicleType::PoliceCar),
            Self::Accident => None,
        }
    }
}

/// Severity of an incident, from 1 (low) to 4 (critical).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentSeverity {
    /// Level 1: non-urgent.
    Low = 1,
    /// Level 2: urgent, not life-threatening.
    Medium = 2,
    /// Level 3: potentially life-threatening.
    High = 3,
    /// Level 4: immediate threat to life.
    Critical = 4,
}

impl IncidentSeverity {
    /// Returns the numeric rank of this severity level.
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }
}

/// Lifecycle state of an incident.
///
/// The lifecycle is a strict forward chain
/// `pending → dispatched → en_route → on_scene → resolved`, with
/// `cancelled` reachable from any non-terminal state. There is no revert
/// and no skipping of precursor states.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentStatus {
    /// Reported, awaiting dispatch.
    Pending,
    /// A vehicle has been assigned.
    Dispatched,
    /// The assigned vehicle is moving.
    EnRoute,
    /// Responders are on scene.
    OnScene,
    /// Closed successfully. Terminal.
    Resolved,
    /// Closed by operator cancellation. Terminal.
    Cancelled,
}

impl IncidentStatus {
    /// Whether this status is terminal (`Resolved` or `Cancelled`).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    /// Whether the incident is still being worked.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Only the immediate forward step in the chain is allowed, plus
    /// cancellation from any non-terminal state. Terminal states admit
    /// no transition at all.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Self::Cancelled)
                | (Self::Pending, Self::Dispatched)
                | (Self::Dispatched, Self::EnRoute)
                | (Self::EnRoute, Self::OnScene)
                | (Self::OnScene, Self::Resolved)
        )
    }

    /// The vehicle status mirrored by this incident status, if any.
    ///
    /// Terminal incident states release the vehicle back to `Available`
    /// unconditionally.
    #[must_use]
    pub const fn mirrored_vehicle_status(self) -> Option<VehicleStatus> {
        match self {
            Self::Pending => None,
            Self::Dispatched => Some(VehicleStatus::Dispatched),
            Self::EnRoute => Some(VehicleStatus::EnRoute),
            Self::OnScene => Some(VehicleStatus::OnScene),
            Self::Resolved | Self::Cancelled => Some(VehicleStatus::Available),
        }
    }
}

/// Progress state of a dispatch record, mirroring its incident.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DispatchStatus {
    /// Created, vehicle not yet moving.
    Dispatched,
    /// Vehicle acknowledged and is moving.
    EnRoute,
    /// Vehicle arrived at the scene.
    OnScene,
    /// Incident resolved; record closed.
    Completed,
    /// Incident cancelled; record closed.
    Cancelled,
}

impl DispatchStatus {
    /// Whether this dispatch still holds its vehicle.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Summary of a computed route from a vehicle to an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    /// Route length in meters.
    pub distance_m: f64,
    /// Expected travel time in seconds.
    pub duration_s: f64,
    /// Route geometry as `[lon, lat]` pairs (SRID 4326).
    pub path: Vec<[f64; 2]>,
    /// `true` when the route is a straight-line estimate produced because
    /// the routing collaborator was unavailable.
    pub estimated: bool,
}

/// An emergency service facility reference point.
///
/// Facilities are bulk-imported and effectively immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    /// Arena-assigned id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Facility category.
    pub category: FacilityCategory,
    /// Street address, if known.
    pub address: Option<String>,
    /// Contact phone number, if known.
    pub phone: Option<String>,
    /// Handle to the facility location in the geometry store.
    pub location: LocationId,
    /// Import timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A response vehicle with live position tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Arena-assigned id.
    pub id: i64,
    /// Radio call sign, unique per fleet.
    pub call_sign: String,
    /// Vehicle type.
    pub vehicle_type: VehicleType,
    /// Operational status.
    pub status: VehicleStatus,
    /// Handle to the current position in the geometry store.
    pub location: LocationId,
    /// Heading in degrees, 0-360.
    pub heading_deg: f64,
    /// Current speed in km/h.
    pub speed_kmh: f64,
    /// Facility id of the home base, if any.
    pub home_facility: Option<i64>,
    /// Optimistic-concurrency guard, bumped on every mutation.
    pub version: u64,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// An emergency incident with lifecycle tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Arena-assigned id.
    pub id: i64,
    /// Short human-readable title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Incident kind.
    pub incident_type: IncidentType,
    /// Severity level.
    pub severity: IncidentSeverity,
    /// Lifecycle state. Mutated only by the dispatch coordinator.
    pub status: IncidentStatus,
    /// Handle to the incident location in the geometry store.
    pub location: LocationId,
    /// Street address, if reported.
    pub address: Option<String>,
    /// When the incident was reported.
    pub reported_at: DateTime<Utc>,
    /// When a vehicle was first assigned.
    pub dispatched_at: Option<DateTime<Utc>>,
    /// When the incident reached a terminal state.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Currently assigned vehicle id, while active.
    pub assigned_vehicle: Option<i64>,
    /// Route summary for the active assignment.
    pub route: Option<RouteSummary>,
    /// Optimistic-concurrency guard, bumped on every mutation.
    pub version: u64,
}

/// Record of one vehicle-to-incident assignment.
///
/// The record references its vehicle by id only; the reverse mapping
/// (vehicle id → active dispatch id) is a derived index maintained by the
/// entity arena, so no ownership cycle exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    /// Unique dispatch id.
    pub id: Uuid,
    /// Incident this dispatch serves.
    pub incident_id: i64,
    /// Vehicle assigned by this dispatch.
    pub vehicle_id: i64,
    /// Progress state, mirroring the incident.
    pub status: DispatchStatus,
    /// When the assignment was committed.
    pub created_at: DateTime<Utc>,
    /// When the vehicle acknowledged (went en route).
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// When the vehicle arrived on scene.
    pub arrived_at: Option<DateTime<Utc>>,
    /// When the record was closed (resolved or cancelled).
    pub completed_at: Option<DateTime<Utc>>,
    /// Route summary computed at assignment time.
    pub route: Option<RouteSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_chain_is_legal() {
        use IncidentStatus::{Dispatched, EnRoute, OnScene, Pending, Resolved};
        assert!(Pending.can_transition_to(Dispatched));
        assert!(Dispatched.can_transition_to(EnRoute));
        assert!(EnRoute.can_transition_to(OnScene));
        assert!(OnScene.can_transition_to(Resolved));
    }

    #[test]
    fn skipping_precursor_states_is_illegal() {
        use IncidentStatus::{Dispatched, EnRoute, OnScene, Pending, Resolved};
        assert!(!Pending.can_transition_to(OnScene));
        assert!(!Pending.can_transition_to(EnRoute));
        assert!(!Pending.can_transition_to(Resolved));
        assert!(!Dispatched.can_transition_to(OnScene));
        assert!(!EnRoute.can_transition_to(Resolved));
    }

    #[test]
    fn no_revert_transitions() {
        use IncidentStatus::{Dispatched, EnRoute, OnScene, Pending};
        assert!(!Dispatched.can_transition_to(Pending));
        assert!(!EnRoute.can_transition_to(Dispatched));
        assert!(!OnScene.can_transition_to(EnRoute));
    }

    #[test]
    fn cancellation_legal_from_any_non_terminal_state() {
        use IncidentStatus::{Cancelled, Dispatched, EnRoute, OnScene, Pending};
        for status in [Pending, Dispatched, EnRoute, OnScene] {
            assert!(status.can_transition_to(Cancelled), "{status} -> cancelled");
        }
    }

    #[test]
    fn terminal_states_admit_nothing() {
        use IncidentStatus::{
            Cancelled, Dispatched, EnRoute, OnScene, Pending, Resolved,
        };
        for terminal in [Resolved, Cancelled] {
            for next in [Pending, Dispatched, EnRoute, OnScene, Resolved, Cancelled] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn mirrored_vehicle_status_releases_on_terminal() {
        assert_eq!(
            IncidentStatus::Resolved.mirrored_vehicle_status(),
            Some(VehicleStatus::Available)
        );
        assert_eq!(
            IncidentStatus::Cancelled.mirrored_vehicle_status(),
            Some(VehicleStatus::Available)
        );
        assert_eq!(IncidentStatus::Pending.mirrored_vehicle_status(), None);
        assert_eq!(
            IncidentStatus::EnRoute.mirrored_vehicle_status(),
            Some(VehicleStatus::EnRoute)
        );
    }

    #[test]
    fn severity_ranks_are_ordered() {
        assert!(IncidentSeverity::Low < IncidentSeverity::Critical);
        assert_eq!(IncidentSeverity::Critical.rank(), 4);
        assert_eq!(IncidentSeverity::Low.rank(), 1);
    }

    #[test]
    fn wire_vocabulary_is_snake_case() {
        assert_eq!(FacilityCategory::FireStation.to_string(), "fire_station");
        assert_eq!(
            "en_route".parse::<IncidentStatus>().unwrap(),
            IncidentStatus::EnRoute
        );
        assert_eq!(VehicleType::PoliceCar.as_ref(), "police_car");
    }
}
