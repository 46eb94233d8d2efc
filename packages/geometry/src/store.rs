//! Geometry ownership and spatial indexing.
//!
//! All geometry values live here, keyed by opaque [`LocationId`] handles.
//! Each point layer (facilities, vehicles, incidents) has its own R-tree;
//! the mobile layers are rebuilt on mutation, which keeps the index a
//! derived structure rather than a second source of truth. Boundary
//! polygons are indexed by bounding-box envelope for point lookups and by
//! id / case-insensitive name for direct selection.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use es_locator_models::{FacilityCategory, IncidentType, LocationId, VehicleType};
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use rstar::{AABB, PointDistance, RTree, RTreeObject};

use crate::{GeoError, sphere};

/// Which indexed point layer an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    /// Static facility reference points.
    Facilities,
    /// Mobile response vehicles.
    Vehicles,
    /// Reported incidents.
    Incidents,
}

/// Typed tag carried by every indexed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    /// A facility point with its category.
    Facility(FacilityCategory),
    /// A vehicle point with its type.
    Vehicle(VehicleType),
    /// An incident point with its type.
    Incident(IncidentType),
}

impl PointKind {
    /// The layer this kind of point is indexed in.
    #[must_use]
    pub const fn layer(self) -> Layer {
        match self {
            Self::Facility(_) => Layer::Facilities,
            Self::Vehicle(_) => Layer::Vehicles,
            Self::Incident(_) => Layer::Incidents,
        }
    }
}

/// Selects a boundary by id or by case-insensitive name.
#[derive(Debug, Clone, Copy)]
pub enum BoundarySelector<'a> {
    /// Boundary id.
    Id(i64),
    /// Boundary display name, matched case-insensitively.
    Name(&'a str),
}

impl std::fmt::Display for BoundarySelector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// A named administrative boundary polygon.
#[derive(Debug, Clone)]
pub struct BoundaryRecord {
    /// Boundary id from the import source.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Name in the local language, if different.
    pub local_name: Option<String>,
    /// Original source identifier, if known.
    pub source_ref: Option<String>,
    /// Boundary geometry (WGS84).
    pub geometry: MultiPolygon<f64>,
}

/// A point stored in a layer R-tree, keyed on its unit-sphere position.
pub(crate) struct IndexedPoint {
    pub(crate) owner: i64,
    pub(crate) kind: PointKind,
    pub(crate) lonlat: Point<f64>,
    xyz: [f64; 3],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.xyz)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        sphere::chord_distance_2(self.xyz, *point)
    }
}

/// Envelope-only boundary entry for the point-in-boundary R-tree.
struct BoundaryEnvelope {
    id: i64,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for BoundaryEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

struct StoredPoint {
    kind: PointKind,
    owner: i64,
    lonlat: Point<f64>,
}

pub(crate) struct GeoInner {
    points: BTreeMap<LocationId, StoredPoint>,
    facilities: RTree<IndexedPoint>,
    vehicles: RTree<IndexedPoint>,
    incidents: RTree<IndexedPoint>,
    boundaries: BTreeMap<i64, Arc<BoundaryRecord>>,
    boundary_names: BTreeMap<String, i64>,
    boundary_tree: RTree<BoundaryEnvelope>,
    next_location: u64,
}

impl GeoInner {
    pub(crate) const fn layer(&self, layer: Layer) -> &RTree<IndexedPoint> {
        match layer {
            Layer::Facilities => &self.facilities,
            Layer::Vehicles => &self.vehicles,
            Layer::Incidents => &self.incidents,
        }
    }

    const fn layer_mut(&mut self, layer: Layer) -> &mut RTree<IndexedPoint> {
        match layer {
            Layer::Facilities => &mut self.facilities,
            Layer::Vehicles => &mut self.vehicles,
            Layer::Incidents => &mut self.incidents,
        }
    }
}

/// Owner of all geometry values, shared across query and dispatch paths.
pub struct GeometryStore {
    inner: RwLock<GeoInner>,
}

impl Default for GeometryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GeoInner {
                points: BTreeMap::new(),
                facilities: RTree::new(),
                vehicles: RTree::new(),
                incidents: RTree::new(),
                boundaries: BTreeMap::new(),
                boundary_names: BTreeMap::new(),
                boundary_tree: RTree::new(),
                next_location: 1,
            }),
        }
    }

    /// Inserts a point for `owner` and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidArgument`] if the coordinates are
    /// non-finite or outside lon ±180 / lat ±90.
    pub fn insert_point(
        &self,
        kind: PointKind,
        owner: i64,
        lonlat: Point<f64>,
    ) -> Result<LocationId, GeoError> {
        validate_lonlat(lonlat)?;
        let mut inner = self.write();
        let loc = LocationId(inner.next_location);
        inner.next_location += 1;
        inner.points.insert(loc, StoredPoint { kind, owner, lonlat });
        inner.layer_mut(kind.layer()).insert(IndexedPoint {
            owner,
            kind,
            lonlat,
            xyz: sphere::unit_vector(lonlat),
        });
        Ok(loc)
    }

    /// Moves an existing point to a new position.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidArgument`] for bad coordinates and
    /// [`GeoError::NotFound`] for an unknown handle.
    pub fn relocate(&self, loc: LocationId, lonlat: Point<f64>) -> Result<(), GeoError> {
        validate_lonlat(lonlat)?;
        let mut inner = self.write();
        let layer = match inner.points.get_mut(&loc) {
            Some(stored) => {
                stored.lonlat = lonlat;
                stored.kind.layer()
            }
            None => {
                return Err(GeoError::NotFound {
                    what: "location",
                    key: loc.to_string(),
                });
            }
        };
        rebuild_layer(&mut inner, layer);
        Ok(())
    }

    /// Resolves a location handle to its lon/lat position.
    #[must_use]
    pub fn point(&self, loc: LocationId) -> Option<Point<f64>> {
        self.read().points.get(&loc).map(|stored| stored.lonlat)
    }

    /// Registers an administrative boundary.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidArgument`] if the id is already taken
    /// and [`GeoError::InvalidGeometry`] if the polygon has no extent.
    pub fn insert_boundary(&self, record: BoundaryRecord) -> Result<(), GeoError> {
        let Some(rect) = record.geometry.bounding_rect() else {
            return Err(GeoError::InvalidGeometry {
                message: format!("boundary '{}' has empty geometry", record.name),
            });
        };

        let mut inner = self.write();
        if inner.boundaries.contains_key(&record.id) {
            return Err(GeoError::InvalidArgument {
                message: format!("boundary id {} already registered", record.id),
            });
        }

        let envelope = AABB::from_corners(
            [rect.min().x, rect.min().y],
            [rect.max().x, rect.max().y],
        );
        inner.boundary_tree.insert(BoundaryEnvelope {
            id: record.id,
            envelope,
        });
        inner
            .boundary_names
            .insert(record.name.to_lowercase(), record.id);
        inner.boundaries.insert(record.id, Arc::new(record));
        Ok(())
    }

    /// Looks up a boundary by id or case-insensitive name.
    #[must_use]
    pub fn boundary(&self, selector: BoundarySelector<'_>) -> Option<Arc<BoundaryRecord>> {
        let inner = self.read();
        let id = match selector {
            BoundarySelector::Id(id) => id,
            BoundarySelector::Name(name) => *inner.boundary_names.get(&name.to_lowercase())?,
        };
        inner.boundaries.get(&id).cloned()
    }

    /// Lists all registered boundaries.
    #[must_use]
    pub fn boundaries(&self) -> Vec<Arc<BoundaryRecord>> {
        self.read().boundaries.values().cloned().collect()
    }

    /// Finds the boundary containing a point, if any.
    ///
    /// Envelope candidates come from the R-tree; the exact containment
    /// test runs only on those.
    #[must_use]
    pub fn boundary_containing(&self, lonlat: Point<f64>) -> Option<Arc<BoundaryRecord>> {
        let inner = self.read();
        let query_env = AABB::from_point([lonlat.x(), lonlat.y()]);

        for entry in inner.boundary_tree.locate_in_envelope_intersecting(&query_env) {
            if let Some(record) = inner.boundaries.get(&entry.id)
                && record.geometry.contains(&lonlat)
            {
                return Some(Arc::clone(record));
            }
        }
        None
    }

    /// Number of points in a layer.
    #[must_use]
    pub fn layer_len(&self, layer: Layer) -> usize {
        self.read().layer(layer).size()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, GeoInner> {
        self.inner.read().expect("geometry store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, GeoInner> {
        self.inner.write().expect("geometry store lock poisoned")
    }
}

/// Rebuilds one layer's R-tree from the point map. Used after a point
/// moves; fresh points insert into the existing tree directly.
fn rebuild_layer(inner: &mut GeoInner, layer: Layer) {
    let entries: Vec<IndexedPoint> = inner
        .points
        .values()
        .filter(|stored| stored.kind.layer() == layer)
        .map(|stored| IndexedPoint {
            owner: stored.owner,
            kind: stored.kind,
            lonlat: stored.lonlat,
            xyz: sphere::unit_vector(stored.lonlat),
        })
        .collect();

    let tree = RTree::bulk_load(entries);
    match layer {
        Layer::Facilities => inner.facilities = tree,
        Layer::Vehicles => inner.vehicles = tree,
        Layer::Incidents => inner.incidents = tree,
    }
}

/// Validates that a lon/lat pair is finite and in range.
pub(crate) fn validate_lonlat(p: Point<f64>) -> Result<(), GeoError> {
    let (lon, lat) = (p.x(), p.y());
    if !lon.is_finite() || !lat.is_finite() || !(-180.0..=180.0).contains(&lon)
        || !(-90.0..=90.0).contains(&lat)
    {
        return Err(GeoError::InvalidArgument {
            message: format!("coordinates out of range: lon={lon}, lat={lat}"),
        });
    }
    Ok(())
}
