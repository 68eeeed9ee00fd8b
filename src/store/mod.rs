//! Persistence seam for orders, drivers and offers.
//!
//! Every method that changes more than one record, or changes a record based on
//! its current state, is a single conditional update: the existence check, the
//! state check and the mutation happen under one exclusion scope, so concurrent
//! callers observe either the whole change or none of it.

pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::driver::{ApprovalStatus, Driver, DriverStatus, GeoPoint, VehicleClass};
use crate::models::offer::Offer;
use crate::models::order::{Order, OrderStatus};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),
}

/// Result of trying to bind a pending order to a driver.
#[derive(Debug, Clone)]
pub enum Claim {
    /// Order is now assigned; `expired` lists drivers whose open offers were closed.
    Claimed { order: Order, expired: Vec<Uuid> },
    /// No pending order with that id.
    OrderUnavailable,
    /// Driver missing, not approved, or not available.
    DriverUnavailable,
}

/// Result of a driver availability change.
#[derive(Debug, Clone)]
pub enum StatusChange {
    Changed(Driver),
    NotFound,
    NotApproved,
    /// Driver is busy with an active order; only order completion may free it.
    HasActiveOrder,
}

/// Result of an order lifecycle transition outside of assignment.
#[derive(Debug, Clone)]
pub enum Transition {
    Applied(Order),
    NotFound,
    NotAssignedToDriver,
    Invalid { from: OrderStatus, to: OrderStatus },
}

pub trait DispatchStore: Send + Sync {
    fn insert_order(&self, order: Order) -> Result<(), StoreError>;

    fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    fn orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError>;

    fn insert_driver(&self, driver: Driver) -> Result<(), StoreError>;

    fn driver(&self, id: Uuid) -> Result<Option<Driver>, StoreError>;

    fn drivers(&self) -> Result<Vec<Driver>, StoreError>;

    /// Available, approved drivers of `class` with a known position.
    fn dispatchable_drivers(&self, class: VehicleClass) -> Result<Vec<Driver>, StoreError>;

    fn set_driver_location(
        &self,
        id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Option<Driver>, StoreError>;

    fn set_driver_approval(
        &self,
        id: Uuid,
        approval: ApprovalStatus,
    ) -> Result<Option<Driver>, StoreError>;

    /// Switches between `Available` and `Offline`. Never touches a busy driver.
    fn set_driver_status(&self, id: Uuid, status: DriverStatus) -> Result<StatusChange, StoreError>;

    /// Records offers for `order_id` only while that order is still pending.
    /// Returns false, storing nothing, once it has been assigned or cancelled.
    fn insert_offers_if_pending(&self, order_id: Uuid, offers: Vec<Offer>)
    -> Result<bool, StoreError>;

    fn offers_for_order(&self, order_id: Uuid) -> Result<Vec<Offer>, StoreError>;

    /// Atomically assigns a pending order to an available, approved driver,
    /// accepts that driver's offer and expires every other open offer.
    fn claim_order(&self, order_id: Uuid, driver_id: Uuid, at: DateTime<Utc>)
    -> Result<Claim, StoreError>;

    /// Marks an open (or already rejected) offer as rejected. Returns whether
    /// anything changed.
    fn record_rejection(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Moves an order held by `driver_id` along its delivery lifecycle.
    /// Delivery frees the driver.
    fn advance_order(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Transition, StoreError>;

    /// Cancels an undelivered order, expiring open offers and freeing the driver.
    fn cancel_order(&self, order_id: Uuid, at: DateTime<Utc>) -> Result<Transition, StoreError>;
}
