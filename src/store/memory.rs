use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::models::driver::{ApprovalStatus, Driver, DriverStatus, GeoPoint, VehicleClass};
use crate::models::offer::{Offer, OfferResponse};
use crate::models::order::{Order, OrderStatus};
use crate::store::{Claim, DispatchStore, StatusChange, StoreError, Transition};

/// In-process store backed by sharded maps.
///
/// A `get_mut` guard is the row lock. Operations touching several maps always
/// take guards in the order orders -> drivers -> offers and never re-enter a
/// map while holding one of its guards.
#[derive(Default)]
pub struct MemoryStore {
    orders: DashMap<Uuid, Order>,
    drivers: DashMap<Uuid, Driver>,
    offers: DashMap<Uuid, Vec<Offer>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn offer_count(&self) -> usize {
        self.offers.iter().map(|entry| entry.value().len()).sum()
    }

    fn expire_open_offers(&self, order_id: Uuid, except: Option<Uuid>, at: DateTime<Utc>) -> Vec<Uuid> {
        let mut expired = Vec::new();
        if let Some(mut offers) = self.offers.get_mut(&order_id) {
            for offer in offers.iter_mut() {
                if Some(offer.driver_id) == except {
                    offer.respond(OfferResponse::Accepted, at);
                } else if offer.is_open() {
                    offer.respond(OfferResponse::Expired, at);
                    expired.push(offer.driver_id);
                }
            }
        }
        expired
    }

    fn release_driver(&self, driver_id: Uuid, at: DateTime<Utc>) {
        if let Some(mut driver) = self.drivers.get_mut(&driver_id) {
            if driver.status == DriverStatus::Busy {
                driver.status = DriverStatus::Available;
                driver.updated_at = at;
            }
        }
    }
}

impl DispatchStore for MemoryStore {
    fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        match self.orders.entry(order.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("order {}", order.id))),
            Entry::Vacant(slot) => {
                slot.insert(order);
                Ok(())
            }
        }
    }

    fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    fn orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| status.is_none_or(|wanted| entry.status == wanted))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    fn insert_driver(&self, driver: Driver) -> Result<(), StoreError> {
        match self.drivers.entry(driver.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("driver {}", driver.id))),
            Entry::Vacant(slot) => {
                slot.insert(driver);
                Ok(())
            }
        }
    }

    fn driver(&self, id: Uuid) -> Result<Option<Driver>, StoreError> {
        Ok(self.drivers.get(&id).map(|entry| entry.value().clone()))
    }

    fn drivers(&self) -> Result<Vec<Driver>, StoreError> {
        Ok(self.drivers.iter().map(|entry| entry.value().clone()).collect())
    }

    fn dispatchable_drivers(&self, class: VehicleClass) -> Result<Vec<Driver>, StoreError> {
        Ok(self
            .drivers
            .iter()
            .filter(|entry| {
                let driver = entry.value();
                driver.can_accept() && driver.vehicle_class == class && driver.location.is_some()
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn set_driver_location(
        &self,
        id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Option<Driver>, StoreError> {
        Ok(self.drivers.get_mut(&id).map(|mut driver| {
            driver.location = Some(location);
            driver.last_location_at = Some(at);
            driver.updated_at = at;
            driver.clone()
        }))
    }

    fn set_driver_approval(
        &self,
        id: Uuid,
        approval: ApprovalStatus,
    ) -> Result<Option<Driver>, StoreError> {
        Ok(self.drivers.get_mut(&id).map(|mut driver| {
            driver.approval = approval;
            driver.updated_at = Utc::now();
            driver.clone()
        }))
    }

    fn set_driver_status(&self, id: Uuid, status: DriverStatus) -> Result<StatusChange, StoreError> {
        let Some(mut driver) = self.drivers.get_mut(&id) else {
            return Ok(StatusChange::NotFound);
        };

        if driver.approval != ApprovalStatus::Approved {
            return Ok(StatusChange::NotApproved);
        }

        match (driver.status, status) {
            (DriverStatus::Busy, _) | (_, DriverStatus::Busy) => Ok(StatusChange::HasActiveOrder),
            (DriverStatus::Available | DriverStatus::Offline, next) => {
                driver.status = next;
                driver.updated_at = Utc::now();
                Ok(StatusChange::Changed(driver.clone()))
            }
        }
    }

    fn insert_offers_if_pending(
        &self,
        order_id: Uuid,
        offers: Vec<Offer>,
    ) -> Result<bool, StoreError> {
        // Held until the offers are in, so a claim cannot slip in between.
        let Some(order) = self.orders.get(&order_id) else {
            return Ok(false);
        };
        if order.status != OrderStatus::Pending {
            return Ok(false);
        }

        self.offers
            .entry(order_id)
            .or_default()
            .extend(offers.into_iter().filter(|offer| offer.order_id == order_id));
        Ok(true)
    }

    fn offers_for_order(&self, order_id: Uuid) -> Result<Vec<Offer>, StoreError> {
        Ok(self
            .offers
            .get(&order_id)
            .map(|offers| offers.value().clone())
            .unwrap_or_default())
    }

    fn claim_order(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Claim, StoreError> {
        let Some(mut order) = self.orders.get_mut(&order_id) else {
            return Ok(Claim::OrderUnavailable);
        };
        if order.status != OrderStatus::Pending {
            return Ok(Claim::OrderUnavailable);
        }

        let Some(mut driver) = self.drivers.get_mut(&driver_id) else {
            return Ok(Claim::DriverUnavailable);
        };
        if !driver.can_accept() {
            return Ok(Claim::DriverUnavailable);
        }

        order.status = OrderStatus::Assigned;
        order.driver_id = Some(driver_id);
        order.assigned_at = Some(at);

        driver.status = DriverStatus::Busy;
        driver.updated_at = at;

        let expired = self.expire_open_offers(order_id, Some(driver_id), at);

        Ok(Claim::Claimed {
            order: order.clone(),
            expired,
        })
    }

    fn record_rejection(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(mut offers) = self.offers.get_mut(&order_id) else {
            return Ok(false);
        };

        let Some(offer) = offers.iter_mut().find(|offer| offer.driver_id == driver_id) else {
            return Ok(false);
        };

        match offer.response {
            None => {
                offer.respond(OfferResponse::Rejected, at);
                Ok(true)
            }
            Some(OfferResponse::Rejected | OfferResponse::Accepted | OfferResponse::Expired) => Ok(false),
        }
    }

    fn advance_order(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Transition, StoreError> {
        let Some(mut order) = self.orders.get_mut(&order_id) else {
            return Ok(Transition::NotFound);
        };
        if order.driver_id != Some(driver_id) {
            return Ok(Transition::NotAssignedToDriver);
        }
        if next == OrderStatus::Cancelled || !order.status.can_transition_to(next) {
            return Ok(Transition::Invalid {
                from: order.status,
                to: next,
            });
        }

        order.status = next;
        match next {
            OrderStatus::InProgress => order.picked_up_at = Some(at),
            OrderStatus::Delivered => {
                order.delivered_at = Some(at);
                self.release_driver(driver_id, at);
            }
            OrderStatus::Pending | OrderStatus::Assigned | OrderStatus::Cancelled => {}
        }

        Ok(Transition::Applied(order.clone()))
    }

    fn cancel_order(&self, order_id: Uuid, at: DateTime<Utc>) -> Result<Transition, StoreError> {
        let Some(mut order) = self.orders.get_mut(&order_id) else {
            return Ok(Transition::NotFound);
        };
        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Ok(Transition::Invalid {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        if let Some(driver_id) = order.driver_id.take() {
            self.release_driver(driver_id, at);
        }
        order.status = OrderStatus::Cancelled;
        order.cancelled_at = Some(at);
        self.expire_open_offers(order_id, None, at);

        Ok(Transition::Applied(order.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::MemoryStore;
    use crate::models::driver::{ApprovalStatus, Driver, DriverStatus, GeoPoint, VehicleClass};
    use crate::models::offer::{Offer, OfferResponse};
    use crate::models::order::{NewOrder, Order, OrderStatus};
    use crate::store::{Claim, DispatchStore, StatusChange, Transition};

    fn ready_driver(class: VehicleClass) -> Driver {
        let mut driver = Driver::new("driver".to_string(), class);
        driver.approval = ApprovalStatus::Approved;
        driver.status = DriverStatus::Available;
        driver.location = Some(GeoPoint::new(40.0, -73.0));
        driver
    }

    fn pending_order() -> Order {
        Order::from_new(NewOrder {
            customer_name: "Ada".to_string(),
            pickup_address: "1 Main St".to_string(),
            pickup: GeoPoint::new(40.0, -73.0),
            delivery_address: "9 Elm St".to_string(),
            delivery: GeoPoint::new(40.1, -73.1),
            items_description: None,
            weight_kg: Some(2.0),
            value: None,
        })
    }

    #[test]
    fn dispatchable_filter_requires_every_condition() {
        let store = MemoryStore::new();
        let ok = ready_driver(VehicleClass::Car);
        let mut offline = ready_driver(VehicleClass::Car);
        offline.status = DriverStatus::Offline;
        let mut unapproved = ready_driver(VehicleClass::Car);
        unapproved.approval = ApprovalStatus::Pending;
        let mut nowhere = ready_driver(VehicleClass::Car);
        nowhere.location = None;
        let van = ready_driver(VehicleClass::Van);

        for driver in [ok.clone(), offline, unapproved, nowhere, van] {
            store.insert_driver(driver).unwrap();
        }

        let found = store.dispatchable_drivers(VehicleClass::Car).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ok.id);
    }

    #[test]
    fn claim_accepts_winner_and_expires_the_rest() {
        let store = MemoryStore::new();
        let order = pending_order();
        let winner = ready_driver(VehicleClass::Motorcycle);
        let other = ready_driver(VehicleClass::Motorcycle);
        let rejecting = ready_driver(VehicleClass::Motorcycle);
        store.insert_order(order.clone()).unwrap();
        for driver in [&winner, &other, &rejecting] {
            store.insert_driver(driver.clone()).unwrap();
        }
        store
            .insert_offers_if_pending(
                order.id,
                vec![
                    Offer::new(order.id, winner.id, 1.0),
                    Offer::new(order.id, other.id, 2.0),
                    Offer::new(order.id, rejecting.id, 3.0),
                ],
            )
            .unwrap();
        assert!(store.record_rejection(order.id, rejecting.id, Utc::now()).unwrap());

        let claim = store.claim_order(order.id, winner.id, Utc::now()).unwrap();
        let Claim::Claimed { order: assigned, expired } = claim else {
            panic!("expected claim to succeed");
        };
        assert_eq!(assigned.status, OrderStatus::Assigned);
        assert_eq!(assigned.driver_id, Some(winner.id));
        assert!(assigned.assigned_at.is_some());
        assert_eq!(expired, vec![other.id]);

        let responses: Vec<_> = store
            .offers_for_order(order.id)
            .unwrap()
            .into_iter()
            .map(|offer| (offer.driver_id, offer.response))
            .collect();
        assert!(responses.contains(&(winner.id, Some(OfferResponse::Accepted))));
        assert!(responses.contains(&(other.id, Some(OfferResponse::Expired))));
        assert!(responses.contains(&(rejecting.id, Some(OfferResponse::Rejected))));
        assert_eq!(store.driver(winner.id).unwrap().unwrap().status, DriverStatus::Busy);
    }

    #[test]
    fn offers_are_refused_once_the_order_left_pending() {
        let store = MemoryStore::new();
        let order = pending_order();
        let winner = ready_driver(VehicleClass::Motorcycle);
        let late = ready_driver(VehicleClass::Motorcycle);
        store.insert_order(order.clone()).unwrap();
        store.insert_driver(winner.clone()).unwrap();
        store.claim_order(order.id, winner.id, Utc::now()).unwrap();

        let stored = store
            .insert_offers_if_pending(
                order.id,
                vec![
                    Offer::new(order.id, winner.id, 1.0),
                    Offer::new(order.id, late.id, 2.0),
                ],
            )
            .unwrap();

        assert!(!stored);
        assert!(store.offers_for_order(order.id).unwrap().is_empty());
        assert!(
            !store
                .insert_offers_if_pending(uuid::Uuid::new_v4(), Vec::new())
                .unwrap()
        );
    }

    #[test]
    fn claim_leaves_no_trace_when_driver_is_unavailable() {
        let store = MemoryStore::new();
        let order = pending_order();
        let mut driver = ready_driver(VehicleClass::Car);
        driver.status = DriverStatus::Offline;
        store.insert_order(order.clone()).unwrap();
        store.insert_driver(driver.clone()).unwrap();
        store
            .insert_offers_if_pending(order.id, vec![Offer::new(order.id, driver.id, 1.0)])
            .unwrap();

        let claim = store.claim_order(order.id, driver.id, Utc::now()).unwrap();
        assert!(matches!(claim, Claim::DriverUnavailable));

        let unchanged = store.order(order.id).unwrap().unwrap();
        assert_eq!(unchanged.status, OrderStatus::Pending);
        assert!(unchanged.driver_id.is_none());
        assert!(store.offers_for_order(order.id).unwrap()[0].is_open());
    }

    #[test]
    fn rejection_does_not_reopen_expired_offer() {
        let store = MemoryStore::new();
        let order = pending_order();
        let driver = ready_driver(VehicleClass::Car);
        store.insert_order(order.clone()).unwrap();
        store
            .insert_offers_if_pending(order.id, vec![Offer::new(order.id, driver.id, 1.0)])
            .unwrap();
        store.cancel_order(order.id, Utc::now()).unwrap();

        assert!(!store.record_rejection(order.id, driver.id, Utc::now()).unwrap());
        assert_eq!(
            store.offers_for_order(order.id).unwrap()[0].response,
            Some(OfferResponse::Expired)
        );
    }

    #[test]
    fn delivery_frees_the_driver() {
        let store = MemoryStore::new();
        let order = pending_order();
        let driver = ready_driver(VehicleClass::Motorcycle);
        store.insert_order(order.clone()).unwrap();
        store.insert_driver(driver.clone()).unwrap();
        store.claim_order(order.id, driver.id, Utc::now()).unwrap();

        let skipped = store
            .advance_order(order.id, driver.id, OrderStatus::Delivered, Utc::now())
            .unwrap();
        assert!(matches!(
            skipped,
            Transition::Invalid { from: OrderStatus::Assigned, to: OrderStatus::Delivered }
        ));

        store
            .advance_order(order.id, driver.id, OrderStatus::InProgress, Utc::now())
            .unwrap();
        let done = store
            .advance_order(order.id, driver.id, OrderStatus::Delivered, Utc::now())
            .unwrap();
        let Transition::Applied(done) = done else {
            panic!("expected delivery to apply");
        };
        assert!(done.picked_up_at.is_some());
        assert!(done.delivered_at.is_some());
        assert_eq!(store.driver(driver.id).unwrap().unwrap().status, DriverStatus::Available);
    }

    #[test]
    fn only_the_assigned_driver_advances_an_order() {
        let store = MemoryStore::new();
        let order = pending_order();
        let driver = ready_driver(VehicleClass::Motorcycle);
        store.insert_order(order.clone()).unwrap();
        store.insert_driver(driver.clone()).unwrap();
        store.claim_order(order.id, driver.id, Utc::now()).unwrap();

        let result = store
            .advance_order(order.id, uuid::Uuid::new_v4(), OrderStatus::InProgress, Utc::now())
            .unwrap();
        assert!(matches!(result, Transition::NotAssignedToDriver));
    }

    #[test]
    fn cancelling_an_assigned_order_releases_its_driver() {
        let store = MemoryStore::new();
        let order = pending_order();
        let driver = ready_driver(VehicleClass::Motorcycle);
        store.insert_order(order.clone()).unwrap();
        store.insert_driver(driver.clone()).unwrap();
        store.claim_order(order.id, driver.id, Utc::now()).unwrap();

        let Transition::Applied(cancelled) = store.cancel_order(order.id, Utc::now()).unwrap() else {
            panic!("expected cancel to apply");
        };
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.driver_id.is_none());
        assert_eq!(store.driver(driver.id).unwrap().unwrap().status, DriverStatus::Available);
    }

    #[test]
    fn busy_driver_cannot_go_offline() {
        let store = MemoryStore::new();
        let order = pending_order();
        let driver = ready_driver(VehicleClass::Motorcycle);
        store.insert_order(order.clone()).unwrap();
        store.insert_driver(driver.clone()).unwrap();
        store.claim_order(order.id, driver.id, Utc::now()).unwrap();

        let change = store.set_driver_status(driver.id, DriverStatus::Offline).unwrap();
        assert!(matches!(change, StatusChange::HasActiveOrder));
    }

    #[test]
    fn unapproved_driver_cannot_change_status() {
        let store = MemoryStore::new();
        let driver = Driver::new("new".to_string(), VehicleClass::Car);
        store.insert_driver(driver.clone()).unwrap();

        let change = store.set_driver_status(driver.id, DriverStatus::Available).unwrap();
        assert!(matches!(change, StatusChange::NotApproved));
    }
}
