//! Startup bulk-loading of facilities, boundaries, and the vehicle fleet.
//!
//! Reference data arrives as GeoJSON `FeatureCollection` files named by
//! environment variables. Features with malformed geometry or missing
//! required properties are skipped with a warning; a load is only fatal
//! when the file itself cannot be read or parsed.

use std::fs;
use std::path::Path;

use es_locator_dispatch::{DispatchCoordinator, DispatchError, NewFacility, NewVehicle};
use es_locator_geometry::{BoundaryRecord, GeometryStore};
use geo::MultiPolygon;
use geojson::{FeatureCollection, GeoJson};

/// Errors during startup data loading.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// File read failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GeoJSON parsing failed.
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The file parsed but is not a `FeatureCollection`.
    #[error("not a GeoJSON FeatureCollection: {path}")]
    NotACollection {
        /// The offending file.
        path: String,
    },

    /// Entity registration failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Loads facilities from a GeoJSON file. Returns how many were imported.
///
/// # Errors
///
/// Returns [`BootstrapError`] if the file cannot be read or parsed.
pub fn load_facilities(
    coordinator: &DispatchCoordinator,
    path: &Path,
) -> Result<usize, BootstrapError> {
    let collection = read_collection(path)?;
    Ok(import_facilities(coordinator, &collection))
}

/// Loads administrative boundaries from a GeoJSON file.
///
/// # Errors
///
/// Returns [`BootstrapError`] if the file cannot be read or parsed.
pub fn load_boundaries(
    geometry: &GeometryStore,
    path: &Path,
) -> Result<usize, BootstrapError> {
    let collection = read_collection(path)?;
    Ok(import_boundaries(geometry, &collection))
}

/// Loads the vehicle fleet from a GeoJSON file.
///
/// # Errors
///
/// Returns [`BootstrapError`] if the file cannot be read or parsed.
pub fn load_vehicles(
    coordinator: &DispatchCoordinator,
    path: &Path,
) -> Result<usize, BootstrapError> {
    let collection = read_collection(path)?;
    Ok(import_vehicles(coordinator, &collection))
}

fn read_collection(path: &Path) -> Result<FeatureCollection, BootstrapError> {
    let content = fs::read_to_string(path)?;
    match content.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        GeoJson::Feature(_) | GeoJson::Geometry(_) => Err(BootstrapError::NotACollection {
            path: path.display().to_string(),
        }),
    }
}

fn import_facilities(coordinator: &DispatchCoordinator, collection: &FeatureCollection) -> usize {
    let mut loaded = 0;
    for feature in &collection.features {
        let Some((lon, lat)) = point_of(feature) else {
            log::warn!("skipping facility feature without a point geometry");
            continue;
        };
        let Some(name) = string_prop(feature, "name") else {
            log::warn!("skipping facility feature without a name");
            continue;
        };
        let Some(category) = string_prop(feature, "type").and_then(|s| s.parse().ok()) else {
            log::warn!("skipping facility '{name}' with unknown type");
            continue;
        };

        match coordinator.register_facility(NewFacility {
            name,
            category,
            address: string_prop(feature, "address"),
            phone: string_prop(feature, "phone"),
            lon,
            lat,
        }) {
            Ok(_) => loaded += 1,
            Err(e) => log::warn!("skipping facility: {e}"),
        }
    }
    loaded
}

fn import_boundaries(geometry: &GeometryStore, collection: &FeatureCollection) -> usize {
    let mut loaded = 0;
    for (index, feature) in collection.features.iter().enumerate() {
        let Some(name) = string_prop(feature, "name") else {
            log::warn!("skipping boundary feature without a name");
            continue;
        };
        let Some(multi_polygon) = multipolygon_of(feature) else {
            log::warn!("skipping boundary '{name}' without polygon geometry");
            continue;
        };
        #[allow(clippy::cast_possible_wrap)]
        let id = feature
            .property("id")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(index as i64 + 1);

        match geometry.insert_boundary(BoundaryRecord {
            id,
            name,
            local_name: string_prop(feature, "localName"),
            source_ref: string_prop(feature, "sourceRef"),
            geometry: multi_polygon,
        }) {
            Ok(()) => loaded += 1,
            Err(e) => log::warn!("skipping boundary: {e}"),
        }
    }
    loaded
}

fn import_vehicles(coordinator: &DispatchCoordinator, collection: &FeatureCollection) -> usize {
    let mut loaded = 0;
    for feature in &collection.features {
        let Some((lon, lat)) = point_of(feature) else {
            log::warn!("skipping vehicle feature without a point geometry");
            continue;
        };
        let Some(call_sign) = string_prop(feature, "callSign") else {
            log::warn!("skipping vehicle feature without a call sign");
            continue;
        };
        let Some(vehicle_type) = string_prop(feature, "type").and_then(|s| s.parse().ok()) else {
            log::warn!("skipping vehicle '{call_sign}' with unknown type");
            continue;
        };

        match coordinator.register_vehicle(NewVehicle {
            call_sign,
            vehicle_type,
            home_facility: feature.property("homeFacility").and_then(serde_json::Value::as_i64),
            lon,
            lat,
        }) {
            Ok(_) => loaded += 1,
            Err(e) => log::warn!("skipping vehicle: {e}"),
        }
    }
    loaded
}

fn point_of(feature: &geojson::Feature) -> Option<(f64, f64)> {
    let geometry = feature.geometry.as_ref()?;
    if let geojson::Value::Point(coords) = &geometry.value
        && coords.len() >= 2
    {
        Some((coords[0], coords[1]))
    } else {
        None
    }
}

/// Extracts a polygon or multipolygon geometry as a [`MultiPolygon`].
fn multipolygon_of(feature: &geojson::Feature) -> Option<MultiPolygon<f64>> {
    let geometry = feature.geometry.clone()?;
    let geo_geometry: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

fn string_prop(feature: &geojson::Feature, key: &str) -> Option<String> {
    feature
        .property(key)
        .and_then(serde_json::Value::as_str)
        .map(String::from)
}
