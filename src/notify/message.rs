use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::{DriverStatus, GeoPoint};
use crate::models::order::{Order, OrderStatus};

/// What a driver sees when offered an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSummary {
    pub order_id: Uuid,
    pub customer_name: String,
    pub pickup_address: String,
    pub pickup: GeoPoint,
    pub delivery_address: String,
    pub delivery: GeoPoint,
    pub distance_km: Option<f64>,
    pub estimated_duration_minutes: Option<f64>,
    pub items_description: Option<String>,
    pub weight_kg: Option<f64>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_name: order.customer_name.clone(),
            pickup_address: order.pickup_address.clone(),
            pickup: order.pickup,
            delivery_address: order.delivery_address.clone(),
            delivery: order.delivery,
            distance_km: order.estimated_distance_km,
            estimated_duration_minutes: order.estimated_duration_minutes,
            items_description: order.items_description.clone(),
            weight_kg: order.weight_kg,
        }
    }
}

/// Server to driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    OrderNotification(OrderSummary),
    OrderStatusUpdate {
        order_id: Uuid,
        status: OrderStatus,
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
}

impl OutboundMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Driver to server.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InboundMessage {
    AcceptOrder {
        order_id: Uuid,
    },
    RejectOrder {
        order_id: Uuid,
        #[serde(default)]
        reason: Option<String>,
    },
    UpdateStatus {
        status: DriverStatus,
    },
    UpdateLocation {
        lat: f64,
        lng: f64,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::{InboundMessage, OutboundMessage};
    use crate::models::driver::DriverStatus;
    use crate::models::order::OrderStatus;

    #[test]
    fn status_update_is_tagged_with_type_and_data() {
        let order_id = Uuid::from_u128(7);
        let message = OutboundMessage::OrderStatusUpdate {
            order_id,
            status: OrderStatus::Assigned,
            message: "Order assigned successfully".to_string(),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "order_status_update",
                "data": {
                    "order_id": order_id,
                    "status": "assigned",
                    "message": "Order assigned successfully"
                }
            })
        );
    }

    #[test]
    fn inbound_actions_parse() {
        let order_id = Uuid::from_u128(9);
        let accept: InboundMessage =
            serde_json::from_value(json!({ "action": "accept_order", "order_id": order_id })).unwrap();
        assert_eq!(accept, InboundMessage::AcceptOrder { order_id });

        let reject: InboundMessage = serde_json::from_value(
            json!({ "action": "reject_order", "order_id": order_id, "reason": "Too far away" }),
        )
        .unwrap();
        assert_eq!(
            reject,
            InboundMessage::RejectOrder {
                order_id,
                reason: Some("Too far away".to_string())
            }
        );

        let status: InboundMessage =
            serde_json::from_value(json!({ "action": "update_status", "status": "offline" })).unwrap();
        assert_eq!(status, InboundMessage::UpdateStatus { status: DriverStatus::Offline });
    }

    #[test]
    fn unknown_action_is_rejected() {
        let parsed = serde_json::from_value::<InboundMessage>(json!({ "action": "dance" }));
        assert!(parsed.is_err());
    }
}
