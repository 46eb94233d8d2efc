//! Spherical geometry helpers shared by the point indexes.
//!
//! The R-trees store points as unit vectors on the sphere. Euclidean
//! (chord) distance between unit vectors is strictly monotonic in
//! great-circle distance, so chord ordering in the tree *is* geodesic
//! ordering — no planar approximation is involved. Reported distances
//! use Haversine on the mean Earth radius.

use geo::{Distance, Haversine, Point};

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Converts a lon/lat point (degrees, SRID 4326) to a unit vector.
#[must_use]
pub fn unit_vector(p: Point<f64>) -> [f64; 3] {
    let lon = p.x().to_radians();
    let lat = p.y().to_radians();
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

/// Squared Euclidean distance between two unit vectors.
#[must_use]
pub fn chord_distance_2(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx.mul_add(dx, dy.mul_add(dy, dz * dz))
}

/// Chord length (scaled to unit sphere) subtending a geodesic arc of
/// `arc_m` meters.
#[must_use]
pub fn chord_for_arc(arc_m: f64) -> f64 {
    2.0 * (arc_m / (2.0 * EARTH_RADIUS_M)).sin()
}

/// Geodesic (Haversine) distance in meters between two lon/lat points.
#[must_use]
pub fn geodesic_distance_m(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine.distance(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_vectors_have_unit_norm() {
        for p in [
            Point::new(0.0, 0.0),
            Point::new(-6.26, 53.35),
            Point::new(179.9, -89.0),
        ] {
            let v = unit_vector(p);
            let norm = v[0].mul_add(v[0], v[1].mul_add(v[1], v[2] * v[2]));
            assert!((norm - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = geodesic_distance_m(Point::new(0.0, 0.0), Point::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 200.0, "got {d}");
    }

    #[test]
    fn chord_ordering_matches_geodesic_ordering() {
        // At 60°N a degree of longitude is half a degree of latitude on
        // the ground; planar lon/lat ordering would get this wrong.
        let origin = Point::new(0.0, 60.0);
        let east = Point::new(1.5, 60.0);
        let north = Point::new(0.0, 1.0 + 60.0);

        let q = unit_vector(origin);
        let chord_east = chord_distance_2(q, unit_vector(east));
        let chord_north = chord_distance_2(q, unit_vector(north));

        let geo_east = geodesic_distance_m(origin, east);
        let geo_north = geodesic_distance_m(origin, north);

        assert!(geo_east < geo_north);
        assert!(chord_east < chord_north);
    }

    #[test]
    fn chord_for_arc_round_trips_through_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(0.0, 0.5);
        let arc = geodesic_distance_m(a, b);
        let chord = chord_for_arc(arc);
        let actual = chord_distance_2(unit_vector(a), unit_vector(b)).sqrt();
        assert!((chord - actual).abs() < 1e-9, "{chord} vs {actual}");
    }
}
