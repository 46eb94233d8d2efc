#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry store and spatial query engine.
//!
//! [`GeometryStore`] owns every geometry value in the system — facility,
//! vehicle, and incident point locations plus administrative boundary
//! polygons — behind opaque [`es_locator_models::LocationId`] handles.
//! Point layers are indexed in R-trees keyed on unit-sphere coordinates,
//! so nearest-neighbor ordering in the tree is great-circle ordering on
//! the Earth, correct at any latitude. [`SpatialQueryEngine`] answers the
//! four geometry questions (nearest-K, within-radius, within-polygon,
//! within-boundary) over those indexes; all of its operations are
//! read-only and safe to run concurrently.

pub mod engine;
pub mod sphere;
pub mod store;

pub use engine::{EntityFilter, Hit, SpatialQueryEngine};
pub use store::{BoundaryRecord, BoundarySelector, GeometryStore, Layer, PointKind};

/// Errors from geometry store and spatial query operations.
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    /// Malformed or out-of-range input (coordinates, k, radius).
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected input.
        message: String,
    },

    /// Malformed polygon geometry.
    #[error("invalid geometry: {message}")]
    InvalidGeometry {
        /// Description of the geometry defect.
        message: String,
    },

    /// Unknown boundary or location handle.
    #[error("{what} not found: {key}")]
    NotFound {
        /// What kind of thing was looked up.
        what: &'static str,
        /// The key that failed to resolve.
        key: String,
    },
}

/// Upper bounds applied to spatial query parameters.
#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    /// Maximum `k` for nearest-K queries; larger requests are clamped.
    pub max_nearest: usize,
    /// Maximum radius in meters; larger requests are rejected.
    pub max_radius_m: f64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_nearest: 50,
            max_radius_m: 200_000.0,
        }
    }
}
