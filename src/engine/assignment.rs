use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::selection::{Candidate, DispatchSettings, rank_candidates, required_vehicle_class};
use crate::geo::estimator::DistanceEstimator;
use crate::geo::osrm::RouteOracle;
use crate::models::driver::GeoPoint;
use crate::models::offer::Offer;
use crate::models::order::{NewOrder, Order, OrderStatus};
use crate::store::{Claim, DispatchStore, StoreError, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TakenReason {
    /// The order is no longer pending.
    OrderUnavailable,
    /// The driver is busy, offline, unapproved or unknown.
    DriverUnavailable,
}

/// Outcome of an acceptance attempt. Losing a race is `AlreadyTaken`, not an error.
#[derive(Debug)]
pub enum AssignOutcome {
    Assigned { order: Order, expired: Vec<Uuid> },
    AlreadyTaken(TakenReason),
    PersistenceFailure(StoreError),
}

impl AssignOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AssignOutcome::Assigned { .. } => "assigned",
            AssignOutcome::AlreadyTaken(_) => "already_taken",
            AssignOutcome::PersistenceFailure(_) => "persistence_failure",
        }
    }
}

/// Turns orders into ranked offers and acceptance attempts into single-winner assignments.
pub struct AssignmentService<S, O> {
    store: Arc<S>,
    estimator: DistanceEstimator<O>,
    settings: DispatchSettings,
}

impl<S: DispatchStore, O: RouteOracle> AssignmentService<S, O> {
    pub fn new(store: Arc<S>, oracle: O, settings: DispatchSettings) -> Self {
        Self {
            store,
            estimator: DistanceEstimator::new(oracle),
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stores a new pending order stamped with its pickup-to-delivery estimate.
    pub async fn open_order(&self, new_order: NewOrder) -> Result<Order, StoreError> {
        let mut order = Order::from_new(new_order);
        let route = self.estimator.estimate(order.pickup, order.delivery).await;
        order.estimated_distance_km = Some(route.distance_km);
        order.estimated_duration_minutes = Some(route.duration_minutes);

        self.store.insert_order(order.clone())?;
        info!(
            order_id = %order.id,
            distance_km = route.distance_km,
            source = ?route.source,
            "order opened"
        );
        Ok(order)
    }

    /// Ranks nearby drivers for `order` and records one offer per candidate.
    /// An empty list means no coverage and leaves no offers behind.
    pub async fn select_candidates(&self, order: &Order) -> Result<Vec<Candidate>, StoreError> {
        let class = required_vehicle_class(order.weight_kg);
        let drivers = self.store.dispatchable_drivers(class)?;

        let positions: Vec<(Uuid, GeoPoint)> = drivers
            .iter()
            .filter_map(|driver| driver.location.map(|location| (driver.id, location)))
            .collect();

        if positions.is_empty() {
            info!(order_id = %order.id, vehicle_class = ?class, "no dispatchable drivers");
            return Ok(Vec::new());
        }

        let points: Vec<GeoPoint> = positions.iter().map(|(_, point)| *point).collect();
        let estimates = self.estimator.estimate_many(order.pickup, &points).await;

        let candidates = rank_candidates(
            positions.iter().map(|(id, _)| *id).zip(estimates),
            &self.settings,
        );

        if candidates.is_empty() {
            info!(order_id = %order.id, "no drivers within service radius");
            return Ok(candidates);
        }

        let offers = candidates
            .iter()
            .map(|candidate| Offer::new(order.id, candidate.driver_id, candidate.distance_km))
            .collect();
        // Estimating can take seconds; the order may have been taken meanwhile.
        if !self.store.insert_offers_if_pending(order.id, offers)? {
            info!(order_id = %order.id, "order left pending during selection; no offers sent");
            return Ok(Vec::new());
        }

        info!(order_id = %order.id, candidates = candidates.len(), "offers recorded");
        Ok(candidates)
    }

    /// First driver to get here with the order still pending wins it.
    pub fn try_assign(&self, order_id: Uuid, driver_id: Uuid) -> AssignOutcome {
        match self.store.claim_order(order_id, driver_id, Utc::now()) {
            Ok(Claim::Claimed { order, expired }) => {
                info!(
                    order_id = %order_id,
                    driver_id = %driver_id,
                    expired_offers = expired.len(),
                    "order assigned"
                );
                AssignOutcome::Assigned { order, expired }
            }
            Ok(Claim::OrderUnavailable) => {
                info!(order_id = %order_id, driver_id = %driver_id, "order no longer pending");
                AssignOutcome::AlreadyTaken(TakenReason::OrderUnavailable)
            }
            Ok(Claim::DriverUnavailable) => {
                info!(order_id = %order_id, driver_id = %driver_id, "driver cannot take orders");
                AssignOutcome::AlreadyTaken(TakenReason::DriverUnavailable)
            }
            Err(err) => {
                error!(order_id = %order_id, driver_id = %driver_id, error = %err, "assignment failed");
                AssignOutcome::PersistenceFailure(err)
            }
        }
    }

    /// Idempotent; rejecting a closed offer is a no-op.
    pub fn reject(&self, order_id: Uuid, driver_id: Uuid) -> Result<(), StoreError> {
        if self.store.record_rejection(order_id, driver_id, Utc::now())? {
            info!(order_id = %order_id, driver_id = %driver_id, "offer rejected");
        }
        Ok(())
    }

    pub fn advance(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        next: OrderStatus,
    ) -> Result<Transition, StoreError> {
        let transition = self.store.advance_order(order_id, driver_id, next, Utc::now())?;
        if let Transition::Applied(order) = &transition {
            info!(order_id = %order.id, status = ?order.status, "order advanced");
        }
        Ok(transition)
    }

    pub fn cancel(&self, order_id: Uuid) -> Result<Transition, StoreError> {
        let transition = self.store.cancel_order(order_id, Utc::now())?;
        if let Transition::Applied(order) = &transition {
            info!(order_id = %order.id, "order cancelled");
        }
        Ok(transition)
    }
}
