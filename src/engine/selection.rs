use serde::Serialize;
use uuid::Uuid;

use crate::geo::estimator::{EstimateSource, RouteEstimate};
use crate::models::driver::VehicleClass;

const MOTORCYCLE_MAX_KG: f64 = 5.0;
const CAR_MAX_KG: f64 = 50.0;
const VAN_MAX_KG: f64 = 200.0;

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Drivers farther than this from the pickup are never offered the order.
    pub max_distance_km: f64,
    /// Upper bound on offers sent per order.
    pub max_fan_out: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_distance_km: 50.0,
            max_fan_out: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub driver_id: Uuid,
    pub distance_km: f64,
    pub duration_minutes: f64,
    pub source: EstimateSource,
}

/// Smallest vehicle class that can carry `weight_kg`. Unknown weight counts as light.
pub fn required_vehicle_class(weight_kg: Option<f64>) -> VehicleClass {
    let weight = weight_kg.unwrap_or(1.0);

    if weight <= MOTORCYCLE_MAX_KG {
        VehicleClass::Motorcycle
    } else if weight <= CAR_MAX_KG {
        VehicleClass::Car
    } else if weight <= VAN_MAX_KG {
        VehicleClass::Van
    } else {
        VehicleClass::Truck
    }
}

/// Drops out-of-range drivers, orders the rest nearest first and caps the list.
pub fn rank_candidates<I>(estimates: I, settings: &DispatchSettings) -> Vec<Candidate>
where
    I: IntoIterator<Item = (Uuid, RouteEstimate)>,
{
    let mut candidates: Vec<Candidate> = estimates
        .into_iter()
        .filter(|(_, estimate)| estimate.distance_km <= settings.max_distance_km)
        .map(|(driver_id, estimate)| Candidate {
            driver_id,
            distance_km: estimate.distance_km,
            duration_minutes: estimate.duration_minutes,
            source: estimate.source,
        })
        .collect();

    candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    candidates.truncate(settings.max_fan_out);
    candidates
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{DispatchSettings, rank_candidates, required_vehicle_class};
    use crate::geo::estimator::{EstimateSource, RouteEstimate};
    use crate::models::driver::VehicleClass;

    fn estimate(distance_km: f64) -> RouteEstimate {
        RouteEstimate {
            distance_km,
            duration_minutes: distance_km * 2.0,
            source: EstimateSource::Oracle,
        }
    }

    #[test]
    fn weight_ladder_picks_smallest_sufficient_vehicle() {
        assert_eq!(required_vehicle_class(None), VehicleClass::Motorcycle);
        assert_eq!(required_vehicle_class(Some(5.0)), VehicleClass::Motorcycle);
        assert_eq!(required_vehicle_class(Some(5.01)), VehicleClass::Car);
        assert_eq!(required_vehicle_class(Some(50.0)), VehicleClass::Car);
        assert_eq!(required_vehicle_class(Some(200.0)), VehicleClass::Van);
        assert_eq!(required_vehicle_class(Some(200.5)), VehicleClass::Truck);
    }

    #[test]
    fn ranking_excludes_far_drivers_and_sorts_nearest_first() {
        let near = Uuid::from_u128(1);
        let mid = Uuid::from_u128(2);
        let far = Uuid::from_u128(3);

        let ranked = rank_candidates(
            [(mid, estimate(8.0)), (far, estimate(60.0)), (near, estimate(2.0))],
            &DispatchSettings::default(),
        );

        let ids: Vec<Uuid> = ranked.iter().map(|c| c.driver_id).collect();
        assert_eq!(ids, vec![near, mid]);
    }

    #[test]
    fn boundary_distance_is_in_range() {
        let ranked = rank_candidates(
            [(Uuid::from_u128(1), estimate(50.0))],
            &DispatchSettings::default(),
        );
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn fan_out_is_capped() {
        let settings = DispatchSettings {
            max_distance_km: 50.0,
            max_fan_out: 3,
        };
        let ranked = rank_candidates(
            (0..10u128).map(|i| (Uuid::from_u128(i), estimate(10.0 - i as f64))),
            &settings,
        );

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].distance_km, 1.0);
        assert_eq!(ranked[2].distance_km, 3.0);
    }

    #[test]
    fn no_estimates_means_no_candidates() {
        let ranked = rank_candidates(Vec::new(), &DispatchSettings::default());
        assert!(ranked.is_empty());
    }
}
