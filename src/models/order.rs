use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    InProgress,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Transitions a caller may request directly. `Pending -> Assigned` is
    /// reserved for the atomic assignment path and is not listed here.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        match (self, next) {
            (OrderStatus::Assigned, OrderStatus::InProgress) => true,
            (OrderStatus::InProgress, OrderStatus::Delivered) => true,
            (OrderStatus::Pending, OrderStatus::Cancelled)
            | (OrderStatus::Assigned, OrderStatus::Cancelled)
            | (OrderStatus::InProgress, OrderStatus::Cancelled) => true,
            (OrderStatus::Pending, _)
            | (OrderStatus::Assigned, _)
            | (OrderStatus::InProgress, _)
            | (OrderStatus::Delivered, _)
            | (OrderStatus::Cancelled, _) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub pickup_address: String,
    pub pickup: GeoPoint,
    pub delivery_address: String,
    pub delivery: GeoPoint,
    pub items_description: Option<String>,
    pub weight_kg: Option<f64>,
    pub value: Option<f64>,
    pub status: OrderStatus,
    pub driver_id: Option<Uuid>,
    pub estimated_distance_km: Option<f64>,
    pub estimated_duration_minutes: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Fields supplied by whoever places the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_name: String,
    pub pickup_address: String,
    pub pickup: GeoPoint,
    pub delivery_address: String,
    pub delivery: GeoPoint,
    #[serde(default)]
    pub items_description: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl Order {
    pub fn from_new(new: NewOrder) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_name: new.customer_name,
            pickup_address: new.pickup_address,
            pickup: new.pickup,
            delivery_address: new.delivery_address,
            delivery: new.delivery,
            items_description: new.items_description,
            weight_kg: new.weight_kg,
            value: new.value,
            status: OrderStatus::Pending,
            driver_id: None,
            estimated_distance_km: None,
            estimated_duration_minutes: None,
            created_at: Utc::now(),
            assigned_at: None,
            picked_up_at: None,
            delivered_at: None,
            cancelled_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus;

    #[test]
    fn delivery_lifecycle_moves_forward_only() {
        assert!(OrderStatus::Assigned.can_transition_to(OrderStatus::InProgress));
        assert!(OrderStatus::InProgress.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::InProgress));
        assert!(!OrderStatus::InProgress.can_transition_to(OrderStatus::Assigned));
    }

    #[test]
    fn pending_cannot_be_assigned_through_plain_transition() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Assigned));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::InProgress));
    }

    #[test]
    fn cancel_is_allowed_before_delivery_only() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Assigned.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::InProgress.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }
}
