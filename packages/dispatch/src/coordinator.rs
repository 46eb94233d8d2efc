//! Dispatch coordination.
//!
//! The coordinator owns every mutation of incidents, vehicles, and
//! dispatch records. Assignment is optimistic: candidates are planned
//! under a read lock, routing happens with no lock held, and the commit
//! re-checks incident and vehicle status under the write lock. A request
//! that loses the race fails with `AlreadyAssigned` and mutates nothing.

use std::sync::Arc;

use chrono::Utc;
use es_locator_geometry::{
    EntityFilter, GeometryStore, Layer, PointKind, SpatialQueryEngine, sphere,
};
use es_locator_models::{
    Dispatch, DispatchStatus, Facility, Incident, IncidentStatus, RouteSummary, Vehicle,
    VehicleStatus, VehicleType,
};
use es_locator_routing::{RoutingClient, straight_line_estimate};
use futures::future::join_all;
use geo::Point;
use uuid::Uuid;

use crate::store::EntityStore;
use crate::{DispatchConfig, DispatchError, NewFacility, NewIncident, NewVehicle};

/// Overshoot factor for the nearest-vehicle index query, so availability
/// filtering can still fill the shortlist.
const CANDIDATE_POOL_FACTOR: usize = 4;

/// A vehicle considered for assignment, captured at plan time.
struct Candidate {
    vehicle_id: i64,
    origin: Point<f64>,
    straight_line_m: f64,
}

/// Immutable plan produced under the read lock.
struct AssignmentPlan {
    incident_id: i64,
    destination: Point<f64>,
    explicit: bool,
    candidates: Vec<Candidate>,
}

/// A candidate with its route summary, in commit preference order.
struct RankedCandidate {
    vehicle_id: i64,
    summary: RouteSummary,
}

/// Single source of truth for assignment state.
pub struct DispatchCoordinator {
    entities: Arc<EntityStore>,
    geometry: Arc<GeometryStore>,
    engine: SpatialQueryEngine,
    router: Arc<dyn RoutingClient>,
    config: DispatchConfig,
}

impl DispatchCoordinator {
    /// Creates a coordinator over the shared entity arena and geometry
    /// store.
    #[must_use]
    pub fn new(
        entities: Arc<EntityStore>,
        geometry: Arc<GeometryStore>,
        router: Arc<dyn RoutingClient>,
        config: DispatchConfig,
    ) -> Self {
        let engine = SpatialQueryEngine::new(Arc::clone(&geometry), config.query_limits);
        Self {
            entities,
            geometry,
            engine,
            router,
            config,
        }
    }

    /// Registers a facility and its location.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Geometry`] for out-of-range coordinates.
    pub fn register_facility(&self, new: NewFacility) -> Result<Facility, DispatchError> {
        let id = self.entities.write().allocate_facility_id();
        let location = self.geometry.insert_point(
            PointKind::Facility(new.category),
            id,
            Point::new(new.lon, new.lat),
        )?;
        let now = Utc::now();
        let facility = Facility {
            id,
            name: new.name,
            category: new.category,
            address: new.address,
            phone: new.phone,
            location,
            created_at: now,
            updated_at: now,
        };
        self.entities.write().facilities.insert(id, facility.clone());
        Ok(facility)
    }

    /// Registers a vehicle at its starting position, status `available`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Geometry`] for out-of-range coordinates.
    pub fn register_vehicle(&self, new: NewVehicle) -> Result<Vehicle, DispatchError> {
        let id = self.entities.write().allocate_vehicle_id();
        let location = self.geometry.insert_point(
            PointKind::Vehicle(new.vehicle_type),
            id,
            Point::new(new.lon, new.lat),
        )?;
        let vehicle = Vehicle {
            id,
            call_sign: new.call_sign,
            vehicle_type: new.vehicle_type,
            status: VehicleStatus::Available,
            location,
            heading_deg: 0.0,
            speed_kmh: 0.0,
            home_facility: new.home_facility,
            version: 0,
            updated_at: Utc::now(),
        };
        self.entities.write().vehicles.insert(id, vehicle.clone());
        Ok(vehicle)
    }

    /// Records a reported incident, status `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Geometry`] for out-of-range coordinates.
    pub fn create_incident(&self, new: NewIncident) -> Result<Incident, DispatchError> {
        let id = self.entities.write().allocate_incident_id();
        let location = self.geometry.insert_point(
            PointKind::Incident(new.incident_type),
            id,
            Point::new(new.lon, new.lat),
        )?;
        let incident = Incident {
            id,
            title: new.title,
            description: new.description,
            incident_type: new.incident_type,
            severity: new.severity,
            status: IncidentStatus::Pending,
            location,
            address: new.address,
            reported_at: Utc::now(),
            dispatched_at: None,
            resolved_at: None,
            assigned_vehicle: None,
            route: None,
            version: 0,
        };
        self.entities.write().incidents.insert(id, incident.clone());
        log::info!("incident {id} reported ({} {})", incident.severity, incident.incident_type);
        Ok(incident)
    }

    /// Assigns a vehicle to a pending incident.
    ///
    /// With an explicit `vehicle_id` only that vehicle is considered.
    /// Otherwise the nearest available vehicles are shortlisted, routed,
    /// and the lowest route duration wins; candidates whose route request
    /// failed rank after routed ones by straight-line distance and carry
    /// an estimated route summary.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::NotFound`] — unknown incident or vehicle.
    /// * [`DispatchError::AlreadyAssigned`] — the incident is not
    ///   `pending`, or every candidate vehicle was claimed concurrently.
    /// * [`DispatchError::NoCandidates`] — no available vehicle exists.
    pub async fn assign(
        &self,
        incident_id: i64,
        vehicle_id: Option<i64>,
    ) -> Result<Dispatch, DispatchError> {
        let plan = self.plan_assignment(incident_id, vehicle_id)?;
        let ranked = self.route_candidates(&plan).await;
        self.commit_assignment(&plan, ranked)
    }

    /// Applies a lifecycle transition and mirrors it onto the assigned
    /// vehicle and active dispatch record.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::NotFound`] — unknown incident.
    /// * [`DispatchError::InvalidTransition`] — illegal transition, or
    ///   `dispatched` requested without an active dispatch. State is
    ///   unchanged on failure.
    pub fn update_status(
        &self,
        incident_id: i64,
        new_status: IncidentStatus,
    ) -> Result<Incident, DispatchError> {
        let mut guard = self.entities.write();
        let entities = &mut *guard;

        let has_active = entities.active_by_incident.contains_key(&incident_id);
        let Some(incident) = entities.incidents.get_mut(&incident_id) else {
            return Err(DispatchError::NotFound {
                what: "incident",
                id: incident_id,
            });
        };

        let from = incident.status;
        if !from.can_transition_to(new_status) {
            return Err(DispatchError::InvalidTransition {
                from,
                to: new_status,
            });
        }
        // Entering `dispatched` requires an active dispatch, which only
        // `assign` creates.
        if new_status == IncidentStatus::Dispatched && !has_active {
            return Err(DispatchError::InvalidTransition {
                from,
                to: new_status,
            });
        }

        let now = Utc::now();
        incident.status = new_status;
        incident.version += 1;
        if new_status.is_terminal() {
            incident.resolved_at = Some(now);
        }
        let assigned = incident.assigned_vehicle;
        let updated = incident.clone();

        if let (Some(vehicle_id), Some(mirrored)) = (assigned, new_status.mirrored_vehicle_status())
            && let Some(vehicle) = entities.vehicles.get_mut(&vehicle_id)
        {
            vehicle.status = mirrored;
            vehicle.version += 1;
            vehicle.updated_at = now;
        }

        if let Some(dispatch_id) = entities.active_by_incident.get(&incident_id).copied()
            && let Some(dispatch) = entities.dispatches.get_mut(&dispatch_id)
        {
            match new_status {
                IncidentStatus::EnRoute => {
                    dispatch.status = DispatchStatus::EnRoute;
                    dispatch.acknowledged_at = Some(now);
                }
                IncidentStatus::OnScene => {
                    dispatch.status = DispatchStatus::OnScene;
                    dispatch.arrived_at = Some(now);
                }
                IncidentStatus::Resolved => {
                    dispatch.status = DispatchStatus::Completed;
                    dispatch.completed_at = Some(now);
                }
                IncidentStatus::Cancelled => {
                    dispatch.status = DispatchStatus::Cancelled;
                    dispatch.completed_at = Some(now);
                }
                IncidentStatus::Pending | IncidentStatus::Dispatched => {}
            }
            if !dispatch.status.is_active() {
                entities.active_by_incident.remove(&incident_id);
                if let Some(vehicle_id) = assigned {
                    entities.active_by_vehicle.remove(&vehicle_id);
                }
            }
        }

        log::info!("incident {incident_id}: {from} -> {new_status}");
        Ok(updated)
    }

    /// Computes a route for a candidate vehicle without mutating any
    /// state. Used by dispatchers evaluating an assignment before
    /// committing it.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::NotFound`] — unknown incident or vehicle.
    /// * [`DispatchError::Routing`] — the collaborator is unavailable or
    ///   found no route; preview does not degrade to an estimate.
    pub async fn preview_route(
        &self,
        incident_id: i64,
        vehicle_id: i64,
    ) -> Result<RouteSummary, DispatchError> {
        let (origin_loc, destination_loc) = {
            let entities = self.entities.read();
            let incident =
                entities
                    .incidents
                    .get(&incident_id)
                    .ok_or(DispatchError::NotFound {
                        what: "incident",
                        id: incident_id,
                    })?;
            let vehicle = entities
                .vehicles
                .get(&vehicle_id)
                .ok_or(DispatchError::NotFound {
                    what: "vehicle",
                    id: vehicle_id,
                })?;
            (vehicle.location, incident.location)
        };

        let origin = self
            .geometry
            .point(origin_loc)
            .ok_or(DispatchError::NotFound {
                what: "vehicle location",
                id: vehicle_id,
            })?;
        let destination = self
            .geometry
            .point(destination_loc)
            .ok_or(DispatchError::NotFound {
                what: "incident location",
                id: incident_id,
            })?;

        let route = self
            .router
            .route(origin, destination, self.config.profile)
            .await?;
        Ok(route.into_summary(false))
    }

    /// Updates a vehicle's live position, heading, and speed.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] for an unknown vehicle and
    /// [`DispatchError::Geometry`] for out-of-range coordinates.
    pub fn update_vehicle_position(
        &self,
        vehicle_id: i64,
        lon: f64,
        lat: f64,
        heading_deg: Option<f64>,
        speed_kmh: Option<f64>,
    ) -> Result<Vehicle, DispatchError> {
        let location = self
            .entities
            .read()
            .vehicles
            .get(&vehicle_id)
            .ok_or(DispatchError::NotFound {
                what: "vehicle",
                id: vehicle_id,
            })?
            .location;

        self.geometry.relocate(location, Point::new(lon, lat))?;

        let mut entities = self.entities.write();
        let Some(vehicle) = entities.vehicles.get_mut(&vehicle_id) else {
            return Err(DispatchError::NotFound {
                what: "vehicle",
                id: vehicle_id,
            });
        };
        if let Some(heading) = heading_deg {
            vehicle.heading_deg = heading;
        }
        if let Some(speed) = speed_kmh {
            vehicle.speed_kmh = speed;
        }
        vehicle.version += 1;
        vehicle.updated_at = Utc::now();
        Ok(vehicle.clone())
    }

    /// Plan phase: snapshot the incident and candidate vehicles under
    /// read locks only.
    fn plan_assignment(
        &self,
        incident_id: i64,
        vehicle_id: Option<i64>,
    ) -> Result<AssignmentPlan, DispatchError> {
        let (destination_loc, preferred) = {
            let entities = self.entities.read();
            let incident =
                entities
                    .incidents
                    .get(&incident_id)
                    .ok_or(DispatchError::NotFound {
                        what: "incident",
                        id: incident_id,
                    })?;
            if incident.status != IncidentStatus::Pending {
                return Err(DispatchError::AlreadyAssigned {
                    message: format!("incident {incident_id} is {}", incident.status),
                });
            }
            (incident.location, incident.incident_type.preferred_vehicle())
        };

        let destination = self
            .geometry
            .point(destination_loc)
            .ok_or(DispatchError::NotFound {
                what: "incident location",
                id: incident_id,
            })?;

        let candidates = if let Some(vehicle_id) = vehicle_id {
            vec![self.explicit_candidate(vehicle_id, destination)?]
        } else {
            // Prefer the vehicle type matching the incident; fall back to
            // any type when none of the preferred kind is available.
            let mut found = self.shortlist(destination, preferred)?;
            if found.is_empty() && preferred.is_some() {
                found = self.shortlist(destination, None)?;
            }
            if found.is_empty() {
                return Err(DispatchError::NoCandidates);
            }
            found
        };

        Ok(AssignmentPlan {
            incident_id,
            destination,
            explicit: vehicle_id.is_some(),
            candidates,
        })
    }

    /// Validates an explicitly requested vehicle.
    fn explicit_candidate(
        &self,
        vehicle_id: i64,
        destination: Point<f64>,
    ) -> Result<Candidate, DispatchError> {
        let location = {
            let entities = self.entities.read();
            let vehicle = entities
                .vehicles
                .get(&vehicle_id)
                .ok_or(DispatchError::NotFound {
                    what: "vehicle",
                    id: vehicle_id,
                })?;
            if vehicle.status != VehicleStatus::Available {
                return Err(DispatchError::AlreadyAssigned {
                    message: format!("vehicle {vehicle_id} is {}", vehicle.status),
                });
            }
            vehicle.location
        };
        let origin = self
            .geometry
            .point(location)
            .ok_or(DispatchError::NotFound {
                what: "vehicle location",
                id: vehicle_id,
            })?;
        Ok(Candidate {
            vehicle_id,
            origin,
            straight_line_m: sphere::geodesic_distance_m(origin, destination),
        })
    }

    /// Shortlists the nearest available vehicles, optionally restricted
    /// to one type.
    fn shortlist(
        &self,
        destination: Point<f64>,
        vehicle_type: Option<VehicleType>,
    ) -> Result<Vec<Candidate>, DispatchError> {
        let pool = self.config.shortlist_size.max(1) * CANDIDATE_POOL_FACTOR;
        let hits = self.engine.nearest_k(
            Layer::Vehicles,
            destination,
            pool,
            vehicle_type.map(EntityFilter::VehicleType),
        )?;

        let entities = self.entities.read();
        Ok(hits
            .into_iter()
            .filter(|hit| {
                entities
                    .vehicles
                    .get(&hit.owner)
                    .is_some_and(|vehicle| vehicle.status == VehicleStatus::Available)
            })
            .take(self.config.shortlist_size.max(1))
            .map(|hit| Candidate {
                vehicle_id: hit.owner,
                straight_line_m: hit
                    .distance_m
                    .unwrap_or_else(|| sphere::geodesic_distance_m(hit.lonlat, destination)),
                origin: hit.lonlat,
            })
            .collect())
    }

    /// Route phase: request routes for every candidate with no lock
    /// held. Returns candidates in commit preference order.
    async fn route_candidates(&self, plan: &AssignmentPlan) -> Vec<RankedCandidate> {
        let requests = plan.candidates.iter().map(|candidate| async move {
            let result = self
                .router
                .route(candidate.origin, plan.destination, self.config.profile)
                .await;
            (candidate, result)
        });

        let mut routed: Vec<(f64, RankedCandidate)> = Vec::new();
        let mut estimated: Vec<(f64, RankedCandidate)> = Vec::new();
        for (candidate, result) in join_all(requests).await {
            match result {
                Ok(route) => routed.push((
                    route.duration_s,
                    RankedCandidate {
                        vehicle_id: candidate.vehicle_id,
                        summary: route.into_summary(false),
                    },
                )),
                Err(e) => {
                    log::warn!(
                        "route request failed for vehicle {}: {e}; using straight-line estimate",
                        candidate.vehicle_id
                    );
                    let fallback = straight_line_estimate(candidate.origin, plan.destination);
                    estimated.push((
                        candidate.straight_line_m,
                        RankedCandidate {
                            vehicle_id: candidate.vehicle_id,
                            summary: fallback.into_summary(true),
                        },
                    ));
                }
            }
        }

        routed.sort_by(|a, b| a.0.total_cmp(&b.0));
        estimated.sort_by(|a, b| a.0.total_cmp(&b.0));
        routed
            .into_iter()
            .chain(estimated)
            .map(|(_, ranked)| ranked)
            .collect()
    }

    /// Commit phase: re-check incident and vehicle status under the
    /// write lock, then mutate everything atomically.
    fn commit_assignment(
        &self,
        plan: &AssignmentPlan,
        ranked: Vec<RankedCandidate>,
    ) -> Result<Dispatch, DispatchError> {
        if ranked.is_empty() {
            return Err(DispatchError::NoCandidates);
        }

        let mut guard = self.entities.write();
        let entities = &mut *guard;

        let Some(incident) = entities.incidents.get(&plan.incident_id) else {
            return Err(DispatchError::NotFound {
                what: "incident",
                id: plan.incident_id,
            });
        };
        if incident.status != IncidentStatus::Pending {
            return Err(DispatchError::AlreadyAssigned {
                message: format!("incident {} was assigned concurrently", plan.incident_id),
            });
        }

        let chosen = ranked.into_iter().find(|candidate| {
            entities
                .vehicles
                .get(&candidate.vehicle_id)
                .is_some_and(|vehicle| vehicle.status == VehicleStatus::Available)
        });
        let Some(RankedCandidate { vehicle_id, summary }) = chosen else {
            let message = if plan.explicit {
                "the requested vehicle was assigned concurrently".to_string()
            } else {
                "all candidate vehicles were assigned concurrently".to_string()
            };
            return Err(DispatchError::AlreadyAssigned { message });
        };

        let now = Utc::now();
        let dispatch = Dispatch {
            id: Uuid::new_v4(),
            incident_id: plan.incident_id,
            vehicle_id,
            status: DispatchStatus::Dispatched,
            created_at: now,
            acknowledged_at: None,
            arrived_at: None,
            completed_at: None,
            route: Some(summary.clone()),
        };

        if let Some(incident) = entities.incidents.get_mut(&plan.incident_id) {
            incident.status = IncidentStatus::Dispatched;
            incident.assigned_vehicle = Some(vehicle_id);
            incident.dispatched_at = Some(now);
            incident.route = Some(summary);
            incident.version += 1;
        }
        if let Some(vehicle) = entities.vehicles.get_mut(&vehicle_id) {
            vehicle.status = VehicleStatus::Dispatched;
            vehicle.version += 1;
            vehicle.updated_at = now;
        }
        entities.dispatches.insert(dispatch.id, dispatch.clone());
        entities.active_by_vehicle.insert(vehicle_id, dispatch.id);
        entities
            .active_by_incident
            .insert(plan.incident_id, dispatch.id);

        log::info!(
            "dispatched vehicle {vehicle_id} to incident {} ({})",
            plan.incident_id,
            if dispatch.route.as_ref().is_some_and(|r| r.estimated) {
                "estimated route"
            } else {
                "routed"
            }
        );
        Ok(dispatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use es_locator_models::{IncidentSeverity, IncidentType};
    use es_locator_routing::{Route, RouteProfile, RoutingError};
    use std::time::Duration;

    /// Routing collaborator that is always down.
    struct FailingRouter;

    #[async_trait]
    impl RoutingClient for FailingRouter {
        async fn route(
            &self,
            _origin: Point<f64>,
            _destination: Point<f64>,
            _profile: RouteProfile,
        ) -> Result<Route, RoutingError> {
            Err(RoutingError::Parse {
                message: "stub outage".to_string(),
            })
        }
    }

    /// Routing collaborator that answers after a delay, with duration
    /// proportional to straight-line distance. The delay widens the race
    /// window in concurrency tests.
    struct SlowRouter {
        delay_ms: u64,
    }

    #[async_trait]
    impl RoutingClient for SlowRouter {
        async fn route(
            &self,
            origin: Point<f64>,
            destination: Point<f64>,
            _profile: RouteProfile,
        ) -> Result<Route, RoutingError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            let estimate = straight_line_estimate(origin, destination);
            Ok(Route {
                duration_s: estimate.distance_m / 20.0,
                distance_m: estimate.distance_m,
                path: estimate.path,
            })
        }
    }

    /// Routing collaborator scripted by origin longitude.
    struct ScriptedRouter {
        /// `(origin lon, duration_s)` pairs; unknown origins get no route.
        durations: Vec<(f64, f64)>,
    }

    #[async_trait]
    impl RoutingClient for ScriptedRouter {
        async fn route(
            &self,
            origin: Point<f64>,
            destination: Point<f64>,
            _profile: RouteProfile,
        ) -> Result<Route, RoutingError> {
            self.durations
                .iter()
                .find(|(lon, _)| (origin.x() - lon).abs() < 1e-9)
                .map(|&(_, duration_s)| Route {
                    distance_m: 1_000.0,
                    duration_s,
                    path: vec![
                        [origin.x(), origin.y()],
                        [destination.x(), destination.y()],
                    ],
                })
                .ok_or(RoutingError::NoRoute)
        }
    }

    fn setup(
        router: impl RoutingClient + 'static,
    ) -> (Arc<EntityStore>, Arc<GeometryStore>, DispatchCoordinator) {
        let entities = Arc::new(EntityStore::new());
        let geometry = Arc::new(GeometryStore::new());
        let coordinator = DispatchCoordinator::new(
            Arc::clone(&entities),
            Arc::clone(&geometry),
            Arc::new(router),
            DispatchConfig::default(),
        );
        (entities, geometry, coordinator)
    }

    fn add_vehicle(
        coordinator: &DispatchCoordinator,
        vehicle_type: VehicleType,
        lon: f64,
        lat: f64,
    ) -> Vehicle {
        coordinator
            .register_vehicle(NewVehicle {
                call_sign: format!("unit-{lon}-{lat}"),
                vehicle_type,
                home_facility: None,
                lon,
                lat,
            })
            .unwrap()
    }

    fn add_incident(
        coordinator: &DispatchCoordinator,
        incident_type: IncidentType,
        lon: f64,
        lat: f64,
    ) -> Incident {
        coordinator
            .create_incident(NewIncident {
                title: "test incident".to_string(),
                description: None,
                incident_type,
                severity: IncidentSeverity::High,
                address: None,
                lon,
                lat,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn assign_picks_lowest_route_duration_not_nearest() {
        let (_entities, _geometry, coordinator) = setup(ScriptedRouter {
            durations: vec![(0.1, 500.0), (0.2, 100.0)],
        });
        let near = add_vehicle(&coordinator, VehicleType::Ambulance, 0.1, 0.0);
        let far = add_vehicle(&coordinator, VehicleType::Ambulance, 0.2, 0.0);
        let incident = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);

        let dispatch = coordinator.assign(incident.id, None).await.unwrap();
        assert_eq!(dispatch.vehicle_id, far.id);
        assert_ne!(dispatch.vehicle_id, near.id);

        let route = dispatch.route.unwrap();
        assert!(!route.estimated);
        assert!((route.duration_s - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn assign_degrades_to_straight_line_when_routing_is_down() {
        let (entities, _geometry, coordinator) = setup(FailingRouter);
        let nearest = add_vehicle(&coordinator, VehicleType::Ambulance, 0.0, 0.1);
        add_vehicle(&coordinator, VehicleType::Ambulance, 0.0, 0.5);
        add_vehicle(&coordinator, VehicleType::Ambulance, 0.0, 0.9);
        let incident = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);

        let dispatch = coordinator.assign(incident.id, None).await.unwrap();
        assert_eq!(dispatch.vehicle_id, nearest.id);

        let route = dispatch.route.unwrap();
        assert!(route.estimated);
        assert_eq!(route.path.len(), 2);

        let guard = entities.read();
        assert_eq!(
            guard.vehicles[&nearest.id].status,
            VehicleStatus::Dispatched
        );
        assert_eq!(
            guard.incidents[&incident.id].status,
            IncidentStatus::Dispatched
        );
    }

    #[tokio::test]
    async fn assign_prefers_vehicle_type_matching_incident() {
        let (_entities, _geometry, coordinator) = setup(FailingRouter);
        add_vehicle(&coordinator, VehicleType::PoliceCar, 0.0, 0.01);
        let ambulance = add_vehicle(&coordinator, VehicleType::Ambulance, 0.0, 0.5);
        let incident = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);

        let dispatch = coordinator.assign(incident.id, None).await.unwrap();
        assert_eq!(dispatch.vehicle_id, ambulance.id);
    }

    #[tokio::test]
    async fn assign_falls_back_to_any_type_when_preferred_is_unavailable() {
        let (_entities, _geometry, coordinator) = setup(FailingRouter);
        let police = add_vehicle(&coordinator, VehicleType::PoliceCar, 0.0, 0.01);
        let incident = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);

        let dispatch = coordinator.assign(incident.id, None).await.unwrap();
        assert_eq!(dispatch.vehicle_id, police.id);
    }

    #[tokio::test]
    async fn assign_with_no_vehicles_fails_no_candidates() {
        let (_entities, _geometry, coordinator) = setup(FailingRouter);
        let incident = coordinator
            .create_incident(NewIncident {
                title: "structure fire".to_string(),
                description: None,
                incident_type: IncidentType::Fire,
                severity: IncidentSeverity::Critical,
                address: None,
                lon: -6.26,
                lat: 53.35,
            })
            .unwrap();

        assert!(matches!(
            coordinator.assign(incident.id, None).await,
            Err(DispatchError::NoCandidates)
        ));
    }

    #[tokio::test]
    async fn assign_ignores_busy_vehicles() {
        let (_entities, _geometry, coordinator) = setup(FailingRouter);
        add_vehicle(&coordinator, VehicleType::Ambulance, 0.0, 0.1);
        let first = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);
        let second = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);

        coordinator.assign(first.id, None).await.unwrap();
        // The only vehicle is now dispatched.
        assert!(matches!(
            coordinator.assign(second.id, None).await,
            Err(DispatchError::NoCandidates)
        ));
    }

    #[tokio::test]
    async fn explicit_assign_of_busy_vehicle_fails_already_assigned() {
        let (_entities, _geometry, coordinator) = setup(FailingRouter);
        let vehicle = add_vehicle(&coordinator, VehicleType::Ambulance, 0.0, 0.1);
        let first = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);
        let second = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);

        coordinator.assign(first.id, Some(vehicle.id)).await.unwrap();
        assert!(matches!(
            coordinator.assign(second.id, Some(vehicle.id)).await,
            Err(DispatchError::AlreadyAssigned { .. })
        ));
    }

    #[tokio::test]
    async fn assign_unknown_ids_fail_not_found() {
        let (_entities, _geometry, coordinator) = setup(FailingRouter);
        assert!(matches!(
            coordinator.assign(99, None).await,
            Err(DispatchError::NotFound { .. })
        ));

        let incident = add_incident(&coordinator, IncidentType::Fire, 0.0, 0.0);
        assert!(matches!(
            coordinator.assign(incident.id, Some(42)).await,
            Err(DispatchError::NotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_assigns_on_one_incident_have_exactly_one_winner() {
        let (entities, _geometry, coordinator) = setup(SlowRouter { delay_ms: 50 });
        add_vehicle(&coordinator, VehicleType::Ambulance, 0.0, 0.1);
        add_vehicle(&coordinator, VehicleType::Ambulance, 0.0, 0.2);
        let incident = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);

        let coordinator = Arc::new(coordinator);
        let first = tokio::spawn({
            let c = Arc::clone(&coordinator);
            async move { c.assign(incident.id, None).await }
        });
        let second = tokio::spawn({
            let c = Arc::clone(&coordinator);
            async move { c.assign(incident.id, None).await }
        });
        let results = [first.await.unwrap(), second.await.unwrap()];

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = results.iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(
            loser,
            Err(DispatchError::AlreadyAssigned { .. })
        ));

        // Exactly one vehicle holds exactly one active assignment.
        let guard = entities.read();
        assert_eq!(guard.active_by_incident.len(), 1);
        assert_eq!(guard.active_by_vehicle.len(), 1);
        let dispatched = guard
            .vehicles
            .values()
            .filter(|v| v.status == VehicleStatus::Dispatched)
            .count();
        assert_eq!(dispatched, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_assigns_on_one_vehicle_have_exactly_one_winner() {
        let (entities, _geometry, coordinator) = setup(SlowRouter { delay_ms: 50 });
        let vehicle = add_vehicle(&coordinator, VehicleType::Ambulance, 0.0, 0.1);
        let first = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);
        let second = add_incident(&coordinator, IncidentType::Medical, 0.1, 0.0);

        let coordinator = Arc::new(coordinator);
        let a = tokio::spawn({
            let c = Arc::clone(&coordinator);
            async move { c.assign(first.id, None).await }
        });
        let b = tokio::spawn({
            let c = Arc::clone(&coordinator);
            async move { c.assign(second.id, None).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(matches!(
            results.iter().find(|r| r.is_err()).unwrap(),
            Err(DispatchError::AlreadyAssigned { .. })
        ));

        let guard = entities.read();
        assert_eq!(guard.vehicles[&vehicle.id].status, VehicleStatus::Dispatched);
        assert_eq!(guard.active_by_vehicle.len(), 1);
    }

    #[tokio::test]
    async fn lifecycle_mirrors_vehicle_and_dispatch_record() {
        let (entities, _geometry, coordinator) = setup(ScriptedRouter {
            durations: vec![(0.1, 60.0)],
        });
        let vehicle = add_vehicle(&coordinator, VehicleType::FireEngine, 0.1, 0.0);
        let incident = add_incident(&coordinator, IncidentType::Fire, 0.0, 0.0);

        let dispatch = coordinator.assign(incident.id, None).await.unwrap();

        let updated = coordinator
            .update_status(incident.id, IncidentStatus::EnRoute)
            .unwrap();
        assert_eq!(updated.status, IncidentStatus::EnRoute);
        {
            let guard = entities.read();
            assert_eq!(guard.vehicles[&vehicle.id].status, VehicleStatus::EnRoute);
            let record = &guard.dispatches[&dispatch.id];
            assert_eq!(record.status, DispatchStatus::EnRoute);
            assert!(record.acknowledged_at.is_some());
        }

        coordinator
            .update_status(incident.id, IncidentStatus::OnScene)
            .unwrap();
        let resolved = coordinator
            .update_status(incident.id, IncidentStatus::Resolved)
            .unwrap();
        assert!(resolved.resolved_at.is_some());

        let guard = entities.read();
        assert_eq!(guard.vehicles[&vehicle.id].status, VehicleStatus::Available);
        let record = &guard.dispatches[&dispatch.id];
        assert_eq!(record.status, DispatchStatus::Completed);
        assert!(record.arrived_at.is_some());
        assert!(record.completed_at.is_some());
        assert!(guard.active_by_incident.is_empty());
        assert!(guard.active_by_vehicle.is_empty());
    }

    #[tokio::test]
    async fn illegal_transitions_leave_state_unchanged() {
        let (entities, _geometry, coordinator) = setup(FailingRouter);
        let incident = add_incident(&coordinator, IncidentType::Crime, 0.0, 0.0);

        // Skipping precursor states.
        assert!(matches!(
            coordinator.update_status(incident.id, IncidentStatus::OnScene),
            Err(DispatchError::InvalidTransition { .. })
        ));
        // Entering dispatched without an active dispatch.
        assert!(matches!(
            coordinator.update_status(incident.id, IncidentStatus::Dispatched),
            Err(DispatchError::InvalidTransition { .. })
        ));
        {
            let guard = entities.read();
            assert_eq!(guard.incidents[&incident.id].status, IncidentStatus::Pending);
            assert_eq!(guard.incidents[&incident.id].version, 0);
        }

        // Cancellation from pending is always legal.
        coordinator
            .update_status(incident.id, IncidentStatus::Cancelled)
            .unwrap();

        // Terminal states admit nothing.
        for next in [
            IncidentStatus::Pending,
            IncidentStatus::Dispatched,
            IncidentStatus::EnRoute,
            IncidentStatus::OnScene,
            IncidentStatus::Resolved,
            IncidentStatus::Cancelled,
        ] {
            assert!(matches!(
                coordinator.update_status(incident.id, next),
                Err(DispatchError::InvalidTransition { .. })
            ));
        }
    }

    #[tokio::test]
    async fn cancelling_a_dispatched_incident_releases_the_vehicle() {
        let (entities, _geometry, coordinator) = setup(FailingRouter);
        let vehicle = add_vehicle(&coordinator, VehicleType::Ambulance, 0.0, 0.1);
        let incident = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);

        coordinator.assign(incident.id, None).await.unwrap();
        coordinator
            .update_status(incident.id, IncidentStatus::Cancelled)
            .unwrap();

        let guard = entities.read();
        assert_eq!(guard.vehicles[&vehicle.id].status, VehicleStatus::Available);
        assert!(guard.active_by_vehicle.is_empty());
    }

    #[tokio::test]
    async fn preview_route_does_not_mutate_state() {
        let (entities, _geometry, coordinator) = setup(ScriptedRouter {
            durations: vec![(0.1, 90.0)],
        });
        let vehicle = add_vehicle(&coordinator, VehicleType::Ambulance, 0.1, 0.0);
        let incident = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);

        let summary = coordinator
            .preview_route(incident.id, vehicle.id)
            .await
            .unwrap();
        assert!(!summary.estimated);
        assert!((summary.duration_s - 90.0).abs() < 1e-9);

        let guard = entities.read();
        assert_eq!(guard.incidents[&incident.id].status, IncidentStatus::Pending);
        assert_eq!(guard.vehicles[&vehicle.id].status, VehicleStatus::Available);
        assert!(guard.dispatches.is_empty());
    }

    #[tokio::test]
    async fn preview_route_propagates_routing_failure() {
        let (_entities, _geometry, coordinator) = setup(FailingRouter);
        let vehicle = add_vehicle(&coordinator, VehicleType::Ambulance, 0.1, 0.0);
        let incident = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);

        assert!(matches!(
            coordinator.preview_route(incident.id, vehicle.id).await,
            Err(DispatchError::Routing(_))
        ));
    }

    #[tokio::test]
    async fn vehicle_position_updates_feed_the_spatial_index() {
        let (_entities, geometry, coordinator) = setup(FailingRouter);
        let vehicle = add_vehicle(&coordinator, VehicleType::Ambulance, 0.0, 5.0);
        let incident = add_incident(&coordinator, IncidentType::Medical, 0.0, 0.0);

        let moved = coordinator
            .update_vehicle_position(vehicle.id, 0.0, 0.05, Some(180.0), Some(42.0))
            .unwrap();
        assert_eq!(moved.version, vehicle.version + 1);
        assert!((moved.heading_deg - 180.0).abs() < f64::EPSILON);

        let position = geometry.point(vehicle.location).unwrap();
        assert!((position.y() - 0.05).abs() < 1e-12);

        // The relocated vehicle is now the dispatch candidate.
        let dispatch = coordinator.assign(incident.id, None).await.unwrap();
        assert_eq!(dispatch.vehicle_id, vehicle.id);
    }

    #[tokio::test]
    async fn create_incident_rejects_bad_coordinates() {
        let (_entities, _geometry, coordinator) = setup(FailingRouter);
        let result = coordinator.create_incident(NewIncident {
            title: "bad".to_string(),
            description: None,
            incident_type: IncidentType::Fire,
            severity: IncidentSeverity::Low,
            address: None,
            lon: 191.0,
            lat: 0.0,
        });
        assert!(matches!(result, Err(DispatchError::Geometry(_))));
    }
}
