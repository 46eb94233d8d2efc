#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Routing collaborator contract and adapters.
//!
//! The dispatch coordinator needs travel routes between vehicles and
//! incidents. [`RoutingClient`] is the contract; [`osrm::OsrmClient`] is
//! the production adapter over an OSRM HTTP instance. When the
//! collaborator is down or slow, callers degrade to
//! [`straight_line_estimate`], which the coordinator marks as an
//! estimate rather than failing the whole assignment.

pub mod osrm;

use async_trait::async_trait;
use es_locator_models::RouteSummary;
use geo::{Distance, Haversine, Point};

/// Average response speed assumed when estimating travel time without
/// the routing collaborator, in meters per second (~50 km/h).
pub const ESTIMATE_SPEED_MPS: f64 = 13.9;

/// Errors from routing operations.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// The routing collaborator could not be reached (connection failure,
    /// timeout, server error).
    #[error("routing service unavailable: {0}")]
    Http(#[from] reqwest::Error),

    /// The collaborator answered but found no route between the points.
    #[error("no route found between the given points")]
    NoRoute,

    /// The collaborator's response could not be interpreted.
    #[error("routing response parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

impl RoutingError {
    /// Whether this error means the collaborator itself is unusable, as
    /// opposed to a definitive no-route answer.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Parse { .. })
    }
}

/// Routing profile requested from the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteProfile {
    /// Road vehicle routing.
    #[default]
    Driving,
    /// On-foot routing.
    Walking,
}

impl RouteProfile {
    /// The profile segment used in OSRM request paths.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Driving => "driving",
            Self::Walking => "walking",
        }
    }
}

/// A computed route between two points.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Route length in meters.
    pub distance_m: f64,
    /// Expected travel time in seconds.
    pub duration_s: f64,
    /// Route geometry as `[lon, lat]` pairs.
    pub path: Vec<[f64; 2]>,
}

impl Route {
    /// Converts into the domain route summary, tagging whether it is a
    /// straight-line estimate.
    #[must_use]
    pub fn into_summary(self, estimated: bool) -> RouteSummary {
        RouteSummary {
            distance_m: self.distance_m,
            duration_s: self.duration_s,
            path: self.path,
            estimated,
        }
    }
}

/// Contract for the external routing collaborator.
#[async_trait]
pub trait RoutingClient: Send + Sync {
    /// Computes a route from `origin` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] if the collaborator is unreachable, times
    /// out, answers with no route, or answers unintelligibly.
    async fn route(
        &self,
        origin: Point<f64>,
        destination: Point<f64>,
        profile: RouteProfile,
    ) -> Result<Route, RoutingError>;
}

/// Builds a straight-line fallback route: Haversine distance, duration at
/// the assumed response speed, two-point path.
#[must_use]
pub fn straight_line_estimate(origin: Point<f64>, destination: Point<f64>) -> Route {
    let distance_m = Haversine.distance(origin, destination);
    Route {
        distance_m,
        duration_s: distance_m / ESTIMATE_SPEED_MPS,
        path: vec![
            [origin.x(), origin.y()],
            [destination.x(), destination.y()],
        ],
    }
}
