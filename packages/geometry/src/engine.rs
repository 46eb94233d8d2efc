//! Spatial query engine over the geometry store.
//!
//! Implements the four geometry questions — nearest-K, within-radius,
//! within-polygon, within-boundary — against one point layer at a time.
//! Every operation is read-only, goes through the layer R-tree for
//! candidate generation, and reports geodesic distances in meters.

use std::sync::Arc;

use es_locator_models::{FacilityCategory, IncidentType, VehicleType};
use geo::{BoundingRect, Contains, Point, Polygon, Rect, Validation};

use crate::store::{BoundarySelector, GeometryStore, Layer, PointKind, validate_lonlat};
use crate::{GeoError, QueryLimits, sphere};

/// Relative margin applied to covering-disc prefilters so borderline
/// candidates are never cut off by float rounding.
const PREFILTER_MARGIN: f64 = 1.01;

/// A single query result.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Id of the owning entity.
    pub owner: i64,
    /// Typed tag of the matched point.
    pub kind: PointKind,
    /// Position of the matched point.
    pub lonlat: Point<f64>,
    /// Geodesic distance from the query origin in meters, where the
    /// operation defines one (nearest-K and within-radius).
    pub distance_m: Option<f64>,
}

/// Restricts a query to entities of one type.
#[derive(Debug, Clone, Copy)]
pub enum EntityFilter {
    /// Only facilities of this category.
    Category(FacilityCategory),
    /// Only vehicles of this type.
    VehicleType(VehicleType),
    /// Only incidents of this type.
    IncidentType(IncidentType),
}

impl EntityFilter {
    fn matches(self, kind: PointKind) -> bool {
        match (self, kind) {
            (Self::Category(want), PointKind::Facility(have)) => want == have,
            (Self::VehicleType(want), PointKind::Vehicle(have)) => want == have,
            (Self::IncidentType(want), PointKind::Incident(have)) => want == have,
            _ => false,
        }
    }
}

/// Read-only spatial queries over a [`GeometryStore`].
pub struct SpatialQueryEngine {
    store: Arc<GeometryStore>,
    limits: QueryLimits,
}

impl SpatialQueryEngine {
    /// Creates an engine over `store` with the given limits.
    #[must_use]
    pub const fn new(store: Arc<GeometryStore>, limits: QueryLimits) -> Self {
        Self { store, limits }
    }

    /// Finds the `k` entities nearest to `origin`, ascending by geodesic
    /// distance, ties broken by entity id ascending.
    ///
    /// `k` is clamped to the configured maximum.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidArgument`] if `k < 1` or the origin is
    /// out of range.
    pub fn nearest_k(
        &self,
        layer: Layer,
        origin: Point<f64>,
        k: usize,
        filter: Option<EntityFilter>,
    ) -> Result<Vec<Hit>, GeoError> {
        validate_lonlat(origin)?;
        if k < 1 {
            return Err(GeoError::InvalidArgument {
                message: format!("k must be at least 1, got {k}"),
            });
        }
        let k = k.min(self.limits.max_nearest);

        let inner = self.store.read();
        let query = sphere::unit_vector(origin);

        // The iterator yields ascending chord distance, which is ascending
        // geodesic distance. Keep pulling past k while candidates tie with
        // the k-th distance so the id tie-break sees all of them.
        let mut picked: Vec<(f64, Hit)> = Vec::new();
        for (point, d2) in inner.layer(layer).nearest_neighbor_iter_with_distance_2(&query) {
            if let Some(f) = filter
                && !f.matches(point.kind)
            {
                continue;
            }
            if picked.len() >= k && d2 > picked[picked.len() - 1].0 {
                break;
            }
            picked.push((
                d2,
                Hit {
                    owner: point.owner,
                    kind: point.kind,
                    lonlat: point.lonlat,
                    distance_m: Some(sphere::geodesic_distance_m(origin, point.lonlat)),
                },
            ));
        }

        picked.sort_by(|a, b| {
            a.0.total_cmp(&b.0).then_with(|| a.1.owner.cmp(&b.1.owner))
        });
        picked.truncate(k);
        Ok(picked.into_iter().map(|(_, hit)| hit).collect())
    }

    /// Finds all entities within `radius_m` meters of `origin`, boundary
    /// inclusive, ascending by distance.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidArgument`] if the origin is out of
    /// range or the radius is non-positive, non-finite, or above the
    /// configured maximum.
    pub fn within_radius(
        &self,
        layer: Layer,
        origin: Point<f64>,
        radius_m: f64,
        filter: Option<EntityFilter>,
    ) -> Result<Vec<Hit>, GeoError> {
        validate_lonlat(origin)?;
        if !radius_m.is_finite() || radius_m <= 0.0 || radius_m > self.limits.max_radius_m {
            return Err(GeoError::InvalidArgument {
                message: format!(
                    "radius must be in (0, {}] meters, got {radius_m}",
                    self.limits.max_radius_m
                ),
            });
        }

        let inner = self.store.read();
        let query = sphere::unit_vector(origin);
        let chord = sphere::chord_for_arc(radius_m);
        // Slightly inflated tree radius; the exact geodesic test decides.
        let max_d2 = chord * chord * PREFILTER_MARGIN;

        let mut hits: Vec<Hit> = inner
            .layer(layer)
            .locate_within_distance(query, max_d2)
            .filter(|point| filter.is_none_or(|f| f.matches(point.kind)))
            .filter_map(|point| {
                let distance = sphere::geodesic_distance_m(origin, point.lonlat);
                (distance <= radius_m).then(|| Hit {
                    owner: point.owner,
                    kind: point.kind,
                    lonlat: point.lonlat,
                    distance_m: Some(distance),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance_m
                .unwrap_or(f64::MAX)
                .total_cmp(&b.distance_m.unwrap_or(f64::MAX))
                .then_with(|| a.owner.cmp(&b.owner))
        });
        Ok(hits)
    }

    /// Finds all entities strictly inside `polygon` (boundary points
    /// excluded), ascending by entity id.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidGeometry`] if the polygon is degenerate,
    /// self-intersecting, carries interior rings, or has out-of-range
    /// vertices.
    pub fn within_polygon(
        &self,
        layer: Layer,
        polygon: &Polygon<f64>,
        filter: Option<EntityFilter>,
    ) -> Result<Vec<Hit>, GeoError> {
        validate_polygon(polygon)?;
        let Some(rect) = polygon.bounding_rect() else {
            return Err(GeoError::InvalidGeometry {
                message: "polygon has no extent".to_string(),
            });
        };

        Ok(self.contained(layer, rect, filter, |p| polygon.contains(p)))
    }

    /// Finds all entities contained in the named administrative boundary,
    /// ascending by entity id.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::NotFound`] for an unknown boundary id or name.
    pub fn within_boundary(
        &self,
        layer: Layer,
        selector: BoundarySelector<'_>,
        filter: Option<EntityFilter>,
    ) -> Result<Vec<Hit>, GeoError> {
        let Some(boundary) = self.store.boundary(selector) else {
            return Err(GeoError::NotFound {
                what: "boundary",
                key: selector.to_string(),
            });
        };
        let Some(rect) = boundary.geometry.bounding_rect() else {
            return Err(GeoError::InvalidGeometry {
                message: format!("boundary '{}' has empty geometry", boundary.name),
            });
        };

        Ok(self.contained(layer, rect, filter, |p| boundary.geometry.contains(p)))
    }

    /// Shared containment query: covering-disc R-tree prefilter over the
    /// region's bounding rectangle, then the exact test.
    fn contained(
        &self,
        layer: Layer,
        rect: Rect<f64>,
        filter: Option<EntityFilter>,
        contains: impl Fn(&Point<f64>) -> bool,
    ) -> Vec<Hit> {
        let (center, radius_m) = covering_disc(rect);
        let query = sphere::unit_vector(center);
        let chord = sphere::chord_for_arc(radius_m);
        let max_d2 = chord * chord * PREFILTER_MARGIN;

        let inner = self.store.read();
        let mut hits: Vec<Hit> = inner
            .layer(layer)
            .locate_within_distance(query, max_d2)
            .filter(|point| filter.is_none_or(|f| f.matches(point.kind)))
            .filter(|point| contains(&point.lonlat))
            .map(|point| Hit {
                owner: point.owner,
                kind: point.kind,
                lonlat: point.lonlat,
                distance_m: None,
            })
            .collect();

        hits.sort_by_key(|hit| hit.owner);
        hits
    }
}

/// A geodesic disc guaranteed to cover a lon/lat bounding rectangle:
/// centered on the rectangle, radius the farthest corner plus margin.
fn covering_disc(rect: Rect<f64>) -> (Point<f64>, f64) {
    let center = Point::from(rect.center());
    let corners = [
        Point::new(rect.min().x, rect.min().y),
        Point::new(rect.min().x, rect.max().y),
        Point::new(rect.max().x, rect.min().y),
        Point::new(rect.max().x, rect.max().y),
    ];
    let radius = corners
        .iter()
        .map(|corner| sphere::geodesic_distance_m(center, *corner))
        .fold(0.0_f64, f64::max);
    (center, radius.mul_add(PREFILTER_MARGIN, 1.0))
}

/// Rejects rings that are degenerate, open with fewer than three distinct
/// vertices, self-intersecting, holed, or out of coordinate range.
fn validate_polygon(polygon: &Polygon<f64>) -> Result<(), GeoError> {
    if !polygon.interiors().is_empty() {
        return Err(GeoError::InvalidGeometry {
            message: "polygon must be a single ring without holes".to_string(),
        });
    }
    // Rings are closed on construction, so a valid ring has >= 4 coords.
    if polygon.exterior().0.len() < 4 {
        return Err(GeoError::InvalidGeometry {
            message: "polygon ring needs at least three distinct vertices".to_string(),
        });
    }
    for coord in &polygon.exterior().0 {
        validate_lonlat(Point::new(coord.x, coord.y)).map_err(|_| GeoError::InvalidGeometry {
            message: format!("ring vertex out of range: ({}, {})", coord.x, coord.y),
        })?;
    }
    if !polygon.is_valid() {
        return Err(GeoError::InvalidGeometry {
            message: "polygon ring is self-intersecting or otherwise invalid".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn facility_fixture() -> (Arc<GeometryStore>, SpatialQueryEngine) {
        let store = Arc::new(GeometryStore::new());
        let engine = SpatialQueryEngine::new(Arc::clone(&store), QueryLimits::default());
        (store, engine)
    }

    fn add_facility(store: &GeometryStore, id: i64, category: FacilityCategory, lon: f64, lat: f64) {
        store
            .insert_point(PointKind::Facility(category), id, Point::new(lon, lat))
            .unwrap();
    }

    #[test]
    fn nearest_k_orders_by_geodesic_distance() {
        let (store, engine) = facility_fixture();
        // A at (0,0), B at (0,1).
        add_facility(&store, 1, FacilityCategory::Hospital, 0.0, 0.0);
        add_facility(&store, 2, FacilityCategory::Hospital, 0.0, 1.0);

        let near_a = engine
            .nearest_k(Layer::Facilities, Point::new(0.0, 0.4), 1, None)
            .unwrap();
        assert_eq!(near_a[0].owner, 1);

        let near_b = engine
            .nearest_k(Layer::Facilities, Point::new(0.0, 0.6), 1, None)
            .unwrap();
        assert_eq!(near_b[0].owner, 2);

        let both = engine
            .nearest_k(Layer::Facilities, Point::new(0.0, 0.4), 5, None)
            .unwrap();
        assert_eq!(both.len(), 2);
        assert!(both[0].distance_m.unwrap() <= both[1].distance_m.unwrap());
    }

    #[test]
    fn nearest_k_is_geodesic_not_planar_at_high_latitude() {
        let (store, engine) = facility_fixture();
        // At 60°N, 1.5° of longitude (~83 km) is shorter on the ground
        // than 1.0° of latitude (~111 km), though planar lon/lat math
        // says otherwise.
        add_facility(&store, 1, FacilityCategory::Hospital, 1.5, 60.0);
        add_facility(&store, 2, FacilityCategory::Hospital, 0.0, 61.0);

        let hits = engine
            .nearest_k(Layer::Facilities, Point::new(0.0, 60.0), 2, None)
            .unwrap();
        assert_eq!(hits[0].owner, 1);
        assert_eq!(hits[1].owner, 2);
    }

    #[test]
    fn nearest_k_breaks_ties_by_id_ascending() {
        let (store, engine) = facility_fixture();
        // Symmetric about the origin meridian: identical distances.
        add_facility(&store, 9, FacilityCategory::FireStation, 0.5, 0.0);
        add_facility(&store, 3, FacilityCategory::FireStation, -0.5, 0.0);

        let hits = engine
            .nearest_k(Layer::Facilities, Point::new(0.0, 0.0), 1, None)
            .unwrap();
        assert_eq!(hits[0].owner, 3);
    }

    #[test]
    fn nearest_k_rejects_zero_k_and_clamps_large_k() {
        let (store, engine) = facility_fixture();
        add_facility(&store, 1, FacilityCategory::Hospital, 0.0, 0.0);

        assert!(matches!(
            engine.nearest_k(Layer::Facilities, Point::new(0.0, 0.0), 0, None),
            Err(GeoError::InvalidArgument { .. })
        ));

        let hits = engine
            .nearest_k(Layer::Facilities, Point::new(0.0, 0.0), 10_000, None)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn nearest_k_honors_type_filter() {
        let (store, engine) = facility_fixture();
        add_facility(&store, 1, FacilityCategory::Hospital, 0.0, 0.1);
        add_facility(&store, 2, FacilityCategory::FireStation, 0.0, 0.2);

        let hits = engine
            .nearest_k(
                Layer::Facilities,
                Point::new(0.0, 0.0),
                5,
                Some(EntityFilter::Category(FacilityCategory::FireStation)),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].owner, 2);
    }

    #[test]
    fn within_radius_is_boundary_inclusive() {
        let (store, engine) = facility_fixture();
        add_facility(&store, 1, FacilityCategory::Hospital, 0.0, 0.5);
        add_facility(&store, 2, FacilityCategory::Hospital, 0.0, 2.0);

        let origin = Point::new(0.0, 0.0);
        let exact = sphere::geodesic_distance_m(origin, Point::new(0.0, 0.5));

        let hits = engine
            .within_radius(Layer::Facilities, origin, exact, None)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].owner, 1);
        assert!(hits[0].distance_m.unwrap() <= exact);
    }

    #[test]
    fn within_radius_excludes_beyond_radius() {
        let (store, engine) = facility_fixture();
        add_facility(&store, 1, FacilityCategory::Hospital, 0.0, 0.1);
        add_facility(&store, 2, FacilityCategory::Hospital, 0.0, 1.0);

        let hits = engine
            .within_radius(Layer::Facilities, Point::new(0.0, 0.0), 20_000.0, None)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].owner, 1);
    }

    #[test]
    fn within_radius_rejects_bad_radii() {
        let (_store, engine) = facility_fixture();
        let origin = Point::new(0.0, 0.0);
        for radius in [0.0, -5.0, f64::NAN, 200_000.1] {
            assert!(
                matches!(
                    engine.within_radius(Layer::Facilities, origin, radius, None),
                    Err(GeoError::InvalidArgument { .. })
                ),
                "radius {radius} accepted"
            );
        }
    }

    #[test]
    fn within_polygon_uses_strict_interior() {
        let (store, engine) = facility_fixture();
        add_facility(&store, 1, FacilityCategory::Hospital, 1.0, 1.0); // inside
        add_facility(&store, 2, FacilityCategory::Hospital, 0.0, 1.0); // on edge
        add_facility(&store, 3, FacilityCategory::Hospital, 3.0, 3.0); // outside

        let square: Polygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ];

        let hits = engine
            .within_polygon(Layer::Facilities, &square, None)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].owner, 1);
        assert!(hits[0].distance_m.is_none());
    }

    #[test]
    fn within_polygon_rejects_self_intersecting_ring() {
        let (_store, engine) = facility_fixture();
        let bowtie: Polygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ];
        assert!(matches!(
            engine.within_polygon(Layer::Facilities, &bowtie, None),
            Err(GeoError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn within_polygon_rejects_degenerate_ring() {
        let (_store, engine) = facility_fixture();
        let line: Polygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ];
        assert!(matches!(
            engine.within_polygon(Layer::Facilities, &line, None),
            Err(GeoError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn within_boundary_resolves_name_and_reports_unknown() {
        let (store, engine) = facility_fixture();
        store
            .insert_boundary(crate::store::BoundaryRecord {
                id: 1,
                name: "Fingal".to_string(),
                local_name: None,
                source_ref: None,
                geometry: geo::MultiPolygon(vec![polygon![
                    (x: -7.0, y: 53.0),
                    (x: -6.0, y: 53.0),
                    (x: -6.0, y: 54.0),
                    (x: -7.0, y: 54.0),
                    (x: -7.0, y: 53.0),
                ]]),
            })
            .unwrap();
        add_facility(&store, 1, FacilityCategory::Hospital, -6.5, 53.5);
        add_facility(&store, 2, FacilityCategory::Hospital, -5.0, 53.5);

        let hits = engine
            .within_boundary(Layer::Facilities, BoundarySelector::Name("fingal"), None)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].owner, 1);

        assert!(matches!(
            engine.within_boundary(Layer::Facilities, BoundarySelector::Name("atlantis"), None),
            Err(GeoError::NotFound { .. })
        ));
    }

    #[test]
    fn queries_see_vehicle_relocation() {
        let store = Arc::new(GeometryStore::new());
        let engine = SpatialQueryEngine::new(Arc::clone(&store), QueryLimits::default());
        let loc = store
            .insert_point(
                PointKind::Vehicle(VehicleType::Ambulance),
                1,
                Point::new(0.0, 5.0),
            )
            .unwrap();

        let before = engine
            .within_radius(Layer::Vehicles, Point::new(0.0, 0.0), 50_000.0, None)
            .unwrap();
        assert!(before.is_empty());

        store.relocate(loc, Point::new(0.0, 0.1)).unwrap();
        let after = engine
            .within_radius(Layer::Vehicles, Point::new(0.0, 0.0), 50_000.0, None)
            .unwrap();
        assert_eq!(after.len(), 1);
    }
}
