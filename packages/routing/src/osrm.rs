//! OSRM (Open Source Routing Machine) client.
//!
//! Talks to an OSRM `route` endpoint, e.g. the public demo instance at
//! `https://router.project-osrm.org` or a self-hosted one. Requests carry
//! a bounded timeout so a slow collaborator can never stall a dispatch
//! commit.
//!
//! See <http://project-osrm.org/docs/v5.24.0/api/#route-service>

use std::time::Duration;

use async_trait::async_trait;
use geo::Point;

use crate::{Route, RouteProfile, RoutingClient, RoutingError};

/// Default request timeout for routing calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// HTTP client for an OSRM routing instance.
pub struct OsrmClient {
    client: reqwest::Client,
    base_url: String,
}

impl OsrmClient {
    /// Creates a client for the OSRM instance at `base_url` with a
    /// per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Http`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RoutingError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RoutingClient for OsrmClient {
    async fn route(
        &self,
        origin: Point<f64>,
        destination: Point<f64>,
        profile: RouteProfile,
    ) -> Result<Route, RoutingError> {
        // OSRM takes lon,lat pairs in the path segment.
        let url = format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.base_url,
            profile.as_str(),
            origin.x(),
            origin.y(),
            destination.x(),
            destination.y(),
        );
        log::debug!("requesting route: {url}");

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("overview", "full"),
                ("geometries", "geojson"),
                ("alternatives", "false"),
            ])
            .send()
            .await?;
        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Parses an OSRM route response body.
fn parse_response(body: &serde_json::Value) -> Result<Route, RoutingError> {
    let code = body["code"].as_str().ok_or_else(|| RoutingError::Parse {
        message: "missing code in OSRM response".to_string(),
    })?;

    if code == "NoRoute" {
        return Err(RoutingError::NoRoute);
    }
    if code != "Ok" {
        return Err(RoutingError::Parse {
            message: format!("OSRM returned code {code}"),
        });
    }

    let Some(route) = body["routes"].as_array().and_then(|routes| routes.first()) else {
        return Err(RoutingError::NoRoute);
    };

    let distance_m = route["distance"]
        .as_f64()
        .ok_or_else(|| RoutingError::Parse {
            message: "missing distance in OSRM route".to_string(),
        })?;
    let duration_s = route["duration"]
        .as_f64()
        .ok_or_else(|| RoutingError::Parse {
            message: "missing duration in OSRM route".to_string(),
        })?;

    let coordinates = route["geometry"]["coordinates"]
        .as_array()
        .ok_or_else(|| RoutingError::Parse {
            message: "missing geometry coordinates in OSRM route".to_string(),
        })?;

    let mut path = Vec::with_capacity(coordinates.len());
    for pair in coordinates {
        let (Some(lon), Some(lat)) = (pair[0].as_f64(), pair[1].as_f64()) else {
            return Err(RoutingError::Parse {
                message: "malformed coordinate pair in OSRM geometry".to_string(),
            });
        };
        path.push([lon, lat]);
    }

    Ok(Route {
        distance_m,
        duration_s,
        path,
    })
}
