use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Vehicle classes ordered from lightest to heaviest payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Motorcycle,
    Car,
    Van,
    Truck,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Available,
    Busy,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub vehicle_class: VehicleClass,
    pub approval: ApprovalStatus,
    pub status: DriverStatus,
    pub location: Option<GeoPoint>,
    pub last_location_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(name: String, vehicle_class: VehicleClass) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            vehicle_class,
            approval: ApprovalStatus::Pending,
            status: DriverStatus::Offline,
            location: None,
            last_location_at: None,
            updated_at: Utc::now(),
        }
    }

    /// True when the driver may take a new order right now.
    pub fn can_accept(&self) -> bool {
        self.status == DriverStatus::Available && self.approval == ApprovalStatus::Approved
    }
}
