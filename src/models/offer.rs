use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferResponse {
    Accepted,
    Rejected,
    Expired,
}

/// One order offered to one candidate driver. The audit trail of a dispatch round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub distance_km: f64,
    pub sent_at: DateTime<Utc>,
    pub response: Option<OfferResponse>,
    pub response_at: Option<DateTime<Utc>>,
}

impl Offer {
    pub fn new(order_id: Uuid, driver_id: Uuid, distance_km: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            driver_id,
            distance_km,
            sent_at: Utc::now(),
            response: None,
            response_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.response.is_none()
    }

    pub(crate) fn respond(&mut self, response: OfferResponse, at: DateTime<Utc>) {
        self.response = Some(response);
        self.response_at = Some(at);
    }
}
