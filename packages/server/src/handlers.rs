//! HTTP handler functions for the emergency services locator API.

use actix_web::{HttpResponse, web};
use es_locator_dispatch::{DispatchError, IncidentFilter, VehicleFilter};
use es_locator_geometry::{BoundarySelector, EntityFilter, GeoError, Hit, Layer};
use es_locator_server_models::{
    ApiBoundary, ApiDispatch, ApiFacility, ApiHealth, ApiIncident, ApiRouteSummary, ApiVehicle,
    BoundaryQueryParams, ContainingQueryParams, CreateIncidentRequest, DispatchRequest,
    FacilityQueryParams, IncidentQueryParams, NearestQueryParams, PolygonRequest,
    RadiusQueryParams, RoutePreviewParams, StatusUpdateRequest, VehicleLocationUpdate,
    VehicleQueryParams,
};
use geo::Point;
use geojson::{Feature, FeatureCollection, Geometry, Value};

use crate::AppState;

/// Default number of results for the nearest-facilities endpoint.
const DEFAULT_NEAREST_LIMIT: usize = 5;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/facilities`
///
/// Lists facilities, optionally one category.
pub async fn facilities(
    state: web::Data<AppState>,
    params: web::Query<FacilityQueryParams>,
) -> HttpResponse {
    let views = state.gateway.facilities(params.category);
    let facilities: Vec<ApiFacility> = views.into_iter().map(ApiFacility::from).collect();
    HttpResponse::Ok().json(facilities)
}

/// `GET /api/facilities/nearest`
///
/// K-nearest facilities from a point, ascending by geodesic distance.
pub async fn facilities_nearest(
    state: web::Data<AppState>,
    params: web::Query<NearestQueryParams>,
) -> HttpResponse {
    let limit = params.limit.unwrap_or(DEFAULT_NEAREST_LIMIT);
    match state.engine.nearest_k(
        Layer::Facilities,
        Point::new(params.lon, params.lat),
        limit,
        params.category.map(EntityFilter::Category),
    ) {
        Ok(hits) => HttpResponse::Ok().json(facility_features(&state, hits)),
        Err(e) => geo_error_response(&e),
    }
}

/// `GET /api/facilities/within-radius`
///
/// Facilities within a radius from a point, with distances.
pub async fn facilities_within_radius(
    state: web::Data<AppState>,
    params: web::Query<RadiusQueryParams>,
) -> HttpResponse {
    match state.engine.within_radius(
        Layer::Facilities,
        Point::new(params.lon, params.lat),
        params.radius_m,
        params.category.map(EntityFilter::Category),
    ) {
        Ok(hits) => HttpResponse::Ok().json(facility_features(&state, hits)),
        Err(e) => geo_error_response(&e),
    }
}

/// `POST /api/facilities/within-polygon`
///
/// Facilities strictly inside a GeoJSON polygon.
pub async fn facilities_within_polygon(
    state: web::Data<AppState>,
    body: web::Json<PolygonRequest>,
) -> HttpResponse {
    let request = body.into_inner();
    let polygon = match polygon_from_geojson(request.geometry) {
        Ok(polygon) => polygon,
        Err(e) => return geo_error_response(&e),
    };

    match state.engine.within_polygon(
        Layer::Facilities,
        &polygon,
        request.category.map(EntityFilter::Category),
    ) {
        Ok(hits) => HttpResponse::Ok().json(facility_features(&state, hits)),
        Err(e) => geo_error_response(&e),
    }
}

/// `GET /api/facilities/within-boundary`
///
/// Facilities contained in a named administrative boundary.
pub async fn facilities_within_boundary(
    state: web::Data<AppState>,
    params: web::Query<BoundaryQueryParams>,
) -> HttpResponse {
    let selector = match (params.id, params.name.as_deref()) {
        (Some(id), _) => BoundarySelector::Id(id),
        (None, Some(name)) => BoundarySelector::Name(name),
        (None, None) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "provide boundary id or name"
            }));
        }
    };

    match state.engine.within_boundary(
        Layer::Facilities,
        selector,
        params.category.map(EntityFilter::Category),
    ) {
        Ok(hits) => HttpResponse::Ok().json(facility_features(&state, hits)),
        Err(e) => geo_error_response(&e),
    }
}

/// `GET /api/boundaries`
pub async fn boundaries(state: web::Data<AppState>) -> HttpResponse {
    let records: Vec<ApiBoundary> = state
        .geometry
        .boundaries()
        .into_iter()
        .map(|record| ApiBoundary {
            id: record.id,
            name: record.name.clone(),
            local_name: record.local_name.clone(),
            source_ref: record.source_ref.clone(),
        })
        .collect();
    HttpResponse::Ok().json(records)
}

/// `GET /api/boundaries/containing`
///
/// The boundary containing a point, if any.
pub async fn boundary_containing(
    state: web::Data<AppState>,
    params: web::Query<ContainingQueryParams>,
) -> HttpResponse {
    state.geometry.boundary_containing(Point::new(params.lon, params.lat)).map_or_else(
        || {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": "no boundary contains the given point"
            }))
        },
        |record| {
            HttpResponse::Ok().json(ApiBoundary {
                id: record.id,
                name: record.name.clone(),
                local_name: record.local_name.clone(),
                source_ref: record.source_ref.clone(),
            })
        },
    )
}

/// `POST /api/incidents`
pub async fn create_incident(
    state: web::Data<AppState>,
    body: web::Json<CreateIncidentRequest>,
) -> HttpResponse {
    let request = body.into_inner();
    match state.coordinator.create_incident(es_locator_dispatch::NewIncident {
        title: request.title,
        description: request.description,
        incident_type: request.incident_type,
        severity: request.severity,
        address: request.address,
        lon: request.lon,
        lat: request.lat,
    }) {
        Ok(incident) => state.gateway.incident(incident.id).map_or_else(
            || HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "incident vanished after creation"
            })),
            |view| HttpResponse::Created().json(ApiIncident::from(view)),
        ),
        Err(e) => dispatch_error_response(&e),
    }
}

/// `GET /api/incidents`
///
/// Pollable incident snapshot with filters.
pub async fn incidents(
    state: web::Data<AppState>,
    params: web::Query<IncidentQueryParams>,
) -> HttpResponse {
    let filter = IncidentFilter {
        status: params.status,
        incident_type: params.incident_type,
        min_severity: params.severity_min,
        active_only: params.active.unwrap_or(false),
    };
    let views: Vec<ApiIncident> = state
        .gateway
        .incidents(&filter)
        .into_iter()
        .map(ApiIncident::from)
        .collect();
    HttpResponse::Ok().json(views)
}

/// `GET /api/incidents/geojson`
pub async fn incidents_geojson(
    state: web::Data<AppState>,
    params: web::Query<IncidentQueryParams>,
) -> HttpResponse {
    let filter = IncidentFilter {
        status: params.status,
        incident_type: params.incident_type,
        min_severity: params.severity_min,
        active_only: params.active.unwrap_or(false),
    };
    let features: Vec<Feature> = state
        .gateway
        .incidents(&filter)
        .into_iter()
        .filter_map(|view| {
            let lonlat = view.lonlat?;
            let properties = serde_json::json!({
                "id": view.incident.id,
                "title": view.incident.title,
                "type": view.incident.incident_type,
                "severity": view.incident.severity,
                "status": view.incident.status,
            });
            Some(point_feature(lonlat, &properties))
        })
        .collect();
    HttpResponse::Ok().json(feature_collection(features))
}

/// `POST /api/incidents/{id}/dispatch`
pub async fn dispatch_vehicle(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<DispatchRequest>,
) -> HttpResponse {
    let incident_id = path.into_inner();
    match state
        .coordinator
        .assign(incident_id, body.vehicle_id)
        .await
    {
        Ok(dispatch) => HttpResponse::Ok().json(ApiDispatch::from(dispatch)),
        Err(e) => dispatch_error_response(&e),
    }
}

/// `POST /api/incidents/{id}/status`
pub async fn update_status(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<StatusUpdateRequest>,
) -> HttpResponse {
    let incident_id = path.into_inner();
    match state.coordinator.update_status(incident_id, body.status) {
        Ok(incident) => state.gateway.incident(incident.id).map_or_else(
            || HttpResponse::Ok().json(serde_json::json!({ "id": incident.id })),
            |view| HttpResponse::Ok().json(ApiIncident::from(view)),
        ),
        Err(e) => dispatch_error_response(&e),
    }
}

/// `GET /api/incidents/{id}/route-preview`
pub async fn route_preview(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    params: web::Query<RoutePreviewParams>,
) -> HttpResponse {
    let incident_id = path.into_inner();
    match state
        .coordinator
        .preview_route(incident_id, params.vehicle_id)
        .await
    {
        Ok(summary) => HttpResponse::Ok().json(ApiRouteSummary::from(summary)),
        Err(e) => dispatch_error_response(&e),
    }
}

/// `GET /api/vehicles`
///
/// Pollable vehicle snapshot with filters.
pub async fn vehicles(
    state: web::Data<AppState>,
    params: web::Query<VehicleQueryParams>,
) -> HttpResponse {
    let filter = VehicleFilter {
        status: params.status,
        vehicle_type: params.vehicle_type,
    };
    let views: Vec<ApiVehicle> = state
        .gateway
        .vehicles(&filter)
        .into_iter()
        .map(ApiVehicle::from)
        .collect();
    HttpResponse::Ok().json(views)
}

/// `GET /api/vehicles/geojson`
pub async fn vehicles_geojson(state: web::Data<AppState>) -> HttpResponse {
    let features: Vec<Feature> = state
        .gateway
        .vehicles(&VehicleFilter::default())
        .into_iter()
        .filter_map(|view| {
            let lonlat = view.lonlat?;
            let properties = serde_json::json!({
                "id": view.vehicle.id,
                "callSign": view.vehicle.call_sign,
                "type": view.vehicle.vehicle_type,
                "status": view.vehicle.status,
                "headingDeg": view.vehicle.heading_deg,
                "speedKmh": view.vehicle.speed_kmh,
            });
            Some(point_feature(lonlat, &properties))
        })
        .collect();
    HttpResponse::Ok().json(feature_collection(features))
}

/// `PATCH /api/vehicles/{id}/location`
pub async fn vehicle_location(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<VehicleLocationUpdate>,
) -> HttpResponse {
    let vehicle_id = path.into_inner();
    match state.coordinator.update_vehicle_position(
        vehicle_id,
        body.longitude,
        body.latitude,
        body.heading_deg,
        body.speed_kmh,
    ) {
        Ok(vehicle) => state.gateway.vehicle(vehicle.id).map_or_else(
            || HttpResponse::Ok().json(serde_json::json!({ "id": vehicle.id })),
            |view| HttpResponse::Ok().json(ApiVehicle::from(view)),
        ),
        Err(e) => dispatch_error_response(&e),
    }
}

/// Converts a GeoJSON geometry to a single `geo` polygon.
fn polygon_from_geojson(geometry: geojson::Geometry) -> Result<geo::Polygon<f64>, GeoError> {
    let geo_geometry: geo::Geometry<f64> =
        geometry.try_into().map_err(|e| GeoError::InvalidGeometry {
            message: format!("unparseable geometry: {e}"),
        })?;
    match geo_geometry {
        geo::Geometry::Polygon(polygon) => Ok(polygon),
        other => Err(GeoError::InvalidGeometry {
            message: format!("geometry must be a polygon, got {}", geometry_kind(&other)),
        }),
    }
}

const fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "point",
        geo::Geometry::Line(_) | geo::Geometry::LineString(_) => "line string",
        geo::Geometry::Polygon(_) => "polygon",
        geo::Geometry::MultiPoint(_) => "multi point",
        geo::Geometry::MultiLineString(_) => "multi line string",
        geo::Geometry::MultiPolygon(_) => "multi polygon",
        geo::Geometry::GeometryCollection(_) => "geometry collection",
        geo::Geometry::Rect(_) => "rect",
        geo::Geometry::Triangle(_) => "triangle",
    }
}

/// Builds the GeoJSON feature collection for facility query hits.
fn facility_features(state: &AppState, hits: Vec<Hit>) -> FeatureCollection {
    let features: Vec<Feature> = hits
        .into_iter()
        .filter_map(|hit| {
            let view = state.gateway.facility(hit.owner)?;
            let properties = serde_json::json!({
                "id": view.facility.id,
                "name": view.facility.name,
                "category": view.facility.category,
                "address": view.facility.address,
                "phone": view.facility.phone,
                "distanceM": hit.distance_m,
            });
            Some(point_feature([hit.lonlat.x(), hit.lonlat.y()], &properties))
        })
        .collect();
    feature_collection(features)
}

fn point_feature(lonlat: [f64; 2], properties: &serde_json::Value) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![lonlat[0], lonlat[1]]))),
        id: None,
        properties: properties.as_object().cloned(),
        foreign_members: None,
    }
}

const fn feature_collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Maps spatial query errors onto HTTP status codes.
fn geo_error_response(e: &GeoError) -> HttpResponse {
    let body = serde_json::json!({ "error": e.to_string() });
    match e {
        GeoError::InvalidArgument { .. } | GeoError::InvalidGeometry { .. } => {
            HttpResponse::BadRequest().json(body)
        }
        GeoError::NotFound { .. } => HttpResponse::NotFound().json(body),
    }
}

/// Maps dispatch errors onto HTTP status codes.
fn dispatch_error_response(e: &DispatchError) -> HttpResponse {
    let body = serde_json::json!({ "error": e.to_string() });
    match e {
        DispatchError::NotFound { .. } | DispatchError::NoCandidates => {
            HttpResponse::NotFound().json(body)
        }
        DispatchError::InvalidTransition { .. } | DispatchError::AlreadyAssigned { .. } => {
            HttpResponse::Conflict().json(body)
        }
        DispatchError::Geometry(inner) => geo_error_response(inner),
        DispatchError::Routing(_) => HttpResponse::BadGateway().json(body),
    }
}
