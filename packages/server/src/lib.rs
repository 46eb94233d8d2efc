#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the emergency services locator.
//!
//! Serves the REST API for spatial facility queries, incident reporting
//! and dispatch, and the polling snapshots consumed by the map frontend.
//! Reference data (facilities, administrative boundaries, vehicle fleet)
//! is bulk-loaded from GeoJSON files at startup; routing goes through an
//! OSRM instance reachable over HTTP.

pub mod bootstrap;
mod handlers;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use es_locator_dispatch::{
    DispatchConfig, DispatchCoordinator, EntityStore, PollingGateway,
};
use es_locator_geometry::{GeometryStore, SpatialQueryEngine};
use es_locator_routing::osrm::OsrmClient;

/// Default OSRM instance when `OSRM_BASE_URL` is unset.
const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

/// Shared application state.
pub struct AppState {
    /// Dispatch coordinator, the single mutation path.
    pub coordinator: Arc<DispatchCoordinator>,
    /// Spatial query engine for facility queries.
    pub engine: Arc<SpatialQueryEngine>,
    /// Read-only snapshot gateway for polling observers.
    pub gateway: Arc<PollingGateway>,
    /// Geometry store, for boundary listings and lookups.
    pub geometry: Arc<GeometryStore>,
}

/// Starts the emergency services locator API server.
///
/// Builds the in-memory stores, loads reference data from the GeoJSON
/// files named by `FACILITIES_GEOJSON`, `BOUNDARIES_GEOJSON`, and
/// `VEHICLES_GEOJSON`, and starts the Actix-Web HTTP server. This is a
/// regular async function — the caller provides the runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind
/// or encounters a runtime error.
///
/// # Panics
///
/// Panics if the routing client cannot be constructed or a configured
/// reference data file fails to load.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let entities = Arc::new(EntityStore::new());
    let geometry = Arc::new(GeometryStore::new());

    let mut config = DispatchConfig::default();
    if let Some(shortlist) = std::env::var("DISPATCH_SHORTLIST")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        config.shortlist_size = shortlist;
    }

    let osrm_url =
        std::env::var("OSRM_BASE_URL").unwrap_or_else(|_| DEFAULT_OSRM_URL.to_string());
    let timeout_secs: u64 = std::env::var("ROUTING_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8);
    log::info!("Routing via {osrm_url} (timeout {timeout_secs}s)");
    let router = OsrmClient::new(&osrm_url, Duration::from_secs(timeout_secs))
        .expect("Failed to construct routing client");

    let coordinator = Arc::new(DispatchCoordinator::new(
        Arc::clone(&entities),
        Arc::clone(&geometry),
        Arc::new(router),
        config,
    ));

    if let Ok(path) = std::env::var("FACILITIES_GEOJSON") {
        let loaded = bootstrap::load_facilities(&coordinator, Path::new(&path))
            .expect("Failed to load facilities");
        log::info!("Loaded {loaded} facilities from {path}");
    }
    if let Ok(path) = std::env::var("BOUNDARIES_GEOJSON") {
        let loaded = bootstrap::load_boundaries(&geometry, Path::new(&path))
            .expect("Failed to load boundaries");
        log::info!("Loaded {loaded} boundaries from {path}");
    }
    if let Ok(path) = std::env::var("VEHICLES_GEOJSON") {
        let loaded = bootstrap::load_vehicles(&coordinator, Path::new(&path))
            .expect("Failed to load vehicles");
        log::info!("Loaded {loaded} vehicles from {path}");
    }

    let engine = Arc::new(SpatialQueryEngine::new(
        Arc::clone(&geometry),
        config.query_limits,
    ));
    let gateway = Arc::new(PollingGateway::new(
        Arc::clone(&entities),
        Arc::clone(&geometry),
    ));

    let state = web::Data::new(AppState {
        coordinator,
        engine,
        gateway,
        geometry,
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(handlers::health))
                    .route("/facilities", web::get().to(handlers::facilities))
                    .route(
                        "/facilities/nearest",
                        web::get().to(handlers::facilities_nearest),
                    )
                    .route(
                        "/facilities/within-radius",
                        web::get().to(handlers::facilities_within_radius),
                    )
                    .route(
                        "/facilities/within-polygon",
                        web::post().to(handlers::facilities_within_polygon),
                    )
                    .route(
                        "/facilities/within-boundary",
                        web::get().to(handlers::facilities_within_boundary),
                    )
                    .route("/boundaries", web::get().to(handlers::boundaries))
                    .route(
                        "/boundaries/containing",
                        web::get().to(handlers::boundary_containing),
                    )
                    .route("/incidents", web::post().to(handlers::create_incident))
                    .route("/incidents", web::get().to(handlers::incidents))
                    .route(
                        "/incidents/geojson",
                        web::get().to(handlers::incidents_geojson),
                    )
                    .route(
                        "/incidents/{id}/dispatch",
                        web::post().to(handlers::dispatch_vehicle),
                    )
                    .route(
                        "/incidents/{id}/status",
                        web::post().to(handlers::update_status),
                    )
                    .route(
                        "/incidents/{id}/route-preview",
                        web::get().to(handlers::route_preview),
                    )
                    .route("/vehicles", web::get().to(handlers::vehicles))
                    .route(
                        "/vehicles/geojson",
                        web::get().to(handlers::vehicles_geojson),
                    )
                    .route(
                        "/vehicles/{id}/location",
                        web::patch().to(handlers::vehicle_location),
                    ),
            )
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
