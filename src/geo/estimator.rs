use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::geo::osrm::RouteOracle;
use crate::geo::{fallback_duration_minutes, haversine_km};
use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    Oracle,
    Fallback,
}

impl EstimateSource {
    pub fn label(self) -> &'static str {
        match self {
            EstimateSource::Oracle => "oracle",
            EstimateSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_minutes: f64,
    pub source: EstimateSource,
}

impl RouteEstimate {
    /// Great-circle distance with the city-speed duration heuristic.
    pub fn fallback(from: &GeoPoint, to: &GeoPoint) -> Self {
        let distance_km = haversine_km(from, to);
        Self {
            distance_km,
            duration_minutes: fallback_duration_minutes(distance_km),
            source: EstimateSource::Fallback,
        }
    }
}

/// Distance/duration estimates that never fail: oracle first, haversine otherwise.
pub struct DistanceEstimator<O> {
    oracle: O,
}

impl<O: RouteOracle> DistanceEstimator<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }

    pub async fn estimate(&self, from: GeoPoint, to: GeoPoint) -> RouteEstimate {
        match self.oracle.route(from, to).await {
            Ok(metrics) => RouteEstimate {
                distance_km: metrics.distance_km,
                duration_minutes: metrics.duration_minutes,
                source: EstimateSource::Oracle,
            },
            Err(err) => {
                warn!(error = %err, "routing oracle unavailable; using great-circle estimate");
                RouteEstimate::fallback(&from, &to)
            }
        }
    }

    /// One estimate per destination, in input order. Each pair falls back on its own.
    pub async fn estimate_many(&self, origin: GeoPoint, destinations: &[GeoPoint]) -> Vec<RouteEstimate> {
        join_all(
            destinations
                .iter()
                .map(|destination| self.estimate(origin, *destination)),
        )
        .await
    }
}
