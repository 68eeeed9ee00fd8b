use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;

use crate::models::driver::GeoPoint;

/// Driving distance and time between two points as reported by a router.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteMetrics {
    pub distance_km: f64,
    pub duration_minutes: f64,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid routing url: {0}")]
    Url(String),

    #[error("no route: {0}")]
    NoRoute(String),
}

/// Point-to-point route lookup. Implementations must bound their own latency.
pub trait RouteOracle: Send + Sync {
    fn route(
        &self,
        from: GeoPoint,
        to: GeoPoint,
    ) -> impl Future<Output = Result<RouteMetrics, OracleError>> + Send;
}

/// HTTP client for the OSRM `route` service, driving profile.
#[derive(Debug, Clone)]
pub struct OsrmClient {
    client: Client,
    endpoint: String,
}

impl OsrmClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn route_url(&self, from: GeoPoint, to: GeoPoint) -> Result<Url, OracleError> {
        // OSRM wants lng,lat pairs.
        let base = format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}",
            self.endpoint, from.lng, from.lat, to.lng, to.lat
        );
        let mut url = Url::parse(&base)
            .map_err(|err| OracleError::Url(format!("failed to build OSRM URL: {err}")))?;
        url.query_pairs_mut()
            .append_pair("overview", "false")
            .append_pair("steps", "false");
        Ok(url)
    }
}

impl RouteOracle for OsrmClient {
    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteMetrics, OracleError> {
        let url = self.route_url(from, to)?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        let parsed: RouteResponse = response.json().await?;
        parse_route_response(parsed)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    /// meters
    distance: f64,
    /// seconds
    duration: f64,
}

pub(crate) fn parse_route_response(response: RouteResponse) -> Result<RouteMetrics, OracleError> {
    if response.code != "Ok" {
        return Err(OracleError::NoRoute(response.code));
    }

    let route = response
        .routes
        .first()
        .ok_or_else(|| OracleError::NoRoute("response has no routes".to_string()))?;

    if !route.distance.is_finite() || !route.duration.is_finite() || route.distance < 0.0 {
        return Err(OracleError::NoRoute("malformed route metrics".to_string()));
    }

    Ok(RouteMetrics {
        distance_km: route.distance / 1000.0,
        duration_minutes: route.duration / 60.0,
    })
}
