use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prometheus::IntGauge;
use tokio::sync::{Notify, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::order::OrderStatus;
use crate::notify::message::{OrderSummary, OutboundMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Sending half of one driver's live channel. The transport drains the
/// matching receiver onto the socket.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    outbox: mpsc::Sender<String>,
    shutdown: Arc<Notify>,
}

impl Connection {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (outbox, inbox) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: ConnectionId(Uuid::new_v4()),
                outbox,
                shutdown: Arc::new(Notify::new()),
            },
            inbox,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Never waits: a full or closed outbox is a failed delivery.
    pub fn try_push(&self, payload: String) -> Result<(), TrySendError<String>> {
        self.outbox.try_send(payload)
    }

    /// Asks the transport to close the socket. Remembered if nobody waits yet.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves once the hub has dropped this connection.
    pub async fn closed(&self) {
        self.shutdown.notified().await;
    }
}

/// Both directions of the driver/connection binding, always updated together.
#[derive(Default)]
struct Registry {
    by_driver: HashMap<Uuid, Connection>,
    by_connection: HashMap<ConnectionId, Uuid>,
}

impl Registry {
    fn remove_connection(&mut self, connection_id: ConnectionId) -> Option<Uuid> {
        let driver_id = self.by_connection.remove(&connection_id)?;
        if self
            .by_driver
            .get(&driver_id)
            .is_some_and(|current| current.id == connection_id)
        {
            self.by_driver.remove(&driver_id);
        }
        Some(driver_id)
    }
}

/// Live delivery channels keyed by driver. Delivery is at-most-once with no
/// queueing or retry: an offline driver simply misses the message.
#[derive(Default)]
pub struct NotificationHub {
    registry: Mutex<Registry>,
    connected: Option<IntGauge>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `gauge` equal to the number of addressable drivers.
    pub fn with_gauge(gauge: IntGauge) -> Self {
        Self {
            registry: Mutex::default(),
            connected: Some(gauge),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_count(&self, registry: &Registry) {
        if let Some(gauge) = &self.connected {
            gauge.set(registry.by_driver.len() as i64);
        }
    }

    /// Makes `connection` the driver's channel. Returns the connection it
    /// replaced, which stays open but is no longer addressable.
    pub fn register(&self, connection: Connection, driver_id: Uuid) -> Option<ConnectionId> {
        let mut registry = self.registry();
        let connection_id = connection.id;

        let superseded = registry
            .by_driver
            .insert(driver_id, connection)
            .map(|previous| previous.id)
            .filter(|previous| *previous != connection_id);
        if let Some(previous) = superseded {
            registry.by_connection.remove(&previous);
        }
        registry.by_connection.insert(connection_id, driver_id);
        self.record_count(&registry);

        info!(driver_id = %driver_id, connection_id = %connection_id, "driver connected");
        superseded
    }

    /// Idempotent. Returns the driver the connection belonged to, if still registered.
    pub fn unregister(&self, connection_id: ConnectionId) -> Option<Uuid> {
        let mut registry = self.registry();
        let driver_id = registry.remove_connection(connection_id);
        self.record_count(&registry);
        drop(registry);
        if let Some(driver_id) = driver_id {
            info!(driver_id = %driver_id, connection_id = %connection_id, "driver disconnected");
        }
        driver_id
    }

    pub fn send_to_driver(&self, driver_id: Uuid, message: &OutboundMessage) -> bool {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(driver_id = %driver_id, error = %err, "failed to serialize message");
                return false;
            }
        };

        let mut registry = self.registry();
        let Some(connection) = registry.by_driver.get(&driver_id) else {
            debug!(driver_id = %driver_id, "driver not connected; message dropped");
            return false;
        };

        match connection.try_push(payload) {
            Ok(()) => true,
            Err(err) => {
                let reason = match err {
                    TrySendError::Full(_) => "outbox full",
                    TrySendError::Closed(_) => "channel closed",
                };
                warn!(driver_id = %driver_id, reason, "send failed; dropping connection");
                connection.close();
                let connection_id = connection.id;
                registry.remove_connection(connection_id);
                self.record_count(&registry);
                false
            }
        }
    }

    /// Sends the same offer to each driver independently. Returns who got it.
    pub fn notify_order(&self, driver_ids: &[Uuid], summary: &OrderSummary) -> Vec<Uuid> {
        let message = OutboundMessage::OrderNotification(summary.clone());
        driver_ids
            .iter()
            .copied()
            .filter(|driver_id| self.send_to_driver(*driver_id, &message))
            .collect()
    }

    pub fn notify_status(
        &self,
        driver_id: Uuid,
        order_id: Uuid,
        status: OrderStatus,
        text: &str,
    ) -> bool {
        let message = OutboundMessage::OrderStatusUpdate {
            order_id,
            status,
            message: text.to_string(),
        };
        self.send_to_driver(driver_id, &message)
    }

    pub fn connected_drivers(&self) -> Vec<Uuid> {
        self.registry().by_driver.keys().copied().collect()
    }

    pub fn is_connected(&self, driver_id: Uuid) -> bool {
        self.registry().by_driver.contains_key(&driver_id)
    }

    pub fn connection_count(&self) -> usize {
        self.registry().by_driver.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use prometheus::IntGauge;
    use uuid::Uuid;

    use super::{Connection, NotificationHub};
    use crate::models::driver::GeoPoint;
    use crate::models::order::OrderStatus;
    use crate::notify::message::{OrderSummary, OutboundMessage};

    fn summary() -> OrderSummary {
        OrderSummary {
            order_id: Uuid::from_u128(42),
            customer_name: "Lin".to_string(),
            pickup_address: "A".to_string(),
            pickup: GeoPoint::new(1.0, 1.0),
            delivery_address: "B".to_string(),
            delivery: GeoPoint::new(1.1, 1.1),
            distance_km: Some(3.0),
            estimated_duration_minutes: Some(9.0),
            items_description: None,
            weight_kg: None,
        }
    }

    #[test]
    fn unknown_driver_gets_nothing() {
        let hub = NotificationHub::new();
        assert!(!hub.notify_status(Uuid::new_v4(), Uuid::new_v4(), OrderStatus::Assigned, "hi"));
    }

    #[test]
    fn reconnect_supersedes_previous_connection() {
        let hub = NotificationHub::new();
        let driver = Uuid::new_v4();
        let (first, mut first_rx) = Connection::new(8);
        let (second, mut second_rx) = Connection::new(8);
        let first_id = first.id();

        assert_eq!(hub.register(first, driver), None);
        assert_eq!(hub.register(second, driver), Some(first_id));

        assert!(hub.notify_status(driver, Uuid::new_v4(), OrderStatus::Assigned, "yours"));
        assert!(second_rx.try_recv().is_ok());
        assert!(first_rx.try_recv().is_err());

        // The stale connection going away must not unbind the live one.
        assert_eq!(hub.unregister(first_id), None);
        assert!(hub.is_connected(driver));
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let hub = NotificationHub::new();
        let driver = Uuid::new_v4();
        let (connection, _rx) = Connection::new(8);
        let id = connection.id();
        hub.register(connection, driver);

        assert_eq!(hub.unregister(id), Some(driver));
        assert_eq!(hub.unregister(id), None);
        assert!(!hub.is_connected(driver));
    }

    #[test]
    fn closed_channel_is_torn_down_on_send() {
        let hub = NotificationHub::new();
        let driver = Uuid::new_v4();
        let (connection, rx) = Connection::new(8);
        hub.register(connection, driver);
        drop(rx);

        assert!(!hub.send_to_driver(driver, &OutboundMessage::error("x", "y")));
        assert!(!hub.is_connected(driver));
        assert!(hub.connected_drivers().is_empty());
    }

    #[test]
    fn full_outbox_fails_fast() {
        let hub = NotificationHub::new();
        let driver = Uuid::new_v4();
        let (connection, _rx) = Connection::new(1);
        hub.register(connection, driver);

        assert!(hub.send_to_driver(driver, &OutboundMessage::error("a", "first")));
        assert!(!hub.send_to_driver(driver, &OutboundMessage::error("b", "second")));
        assert!(!hub.is_connected(driver));
    }

    #[tokio::test]
    async fn failed_send_closes_socket_and_updates_gauge() {
        let gauge = IntGauge::new("connected_drivers", "test").unwrap();
        let hub = NotificationHub::with_gauge(gauge.clone());
        let driver = Uuid::new_v4();
        let (connection, _rx) = Connection::new(1);
        let watcher = connection.clone();
        hub.register(connection, driver);
        assert_eq!(gauge.get(), 1);

        assert!(hub.send_to_driver(driver, &OutboundMessage::error("a", "first")));
        assert!(!hub.send_to_driver(driver, &OutboundMessage::error("b", "second")));

        assert_eq!(gauge.get(), 0);
        tokio::time::timeout(Duration::from_secs(1), watcher.closed())
            .await
            .unwrap();
    }

    #[test]
    fn unregister_updates_gauge() {
        let gauge = IntGauge::new("connected_drivers", "test").unwrap();
        let hub = NotificationHub::with_gauge(gauge.clone());
        let (connection, _rx) = Connection::new(8);
        let id = connection.id();
        hub.register(connection, Uuid::new_v4());

        hub.unregister(id);
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn fan_out_reports_only_delivered_drivers() {
        let hub = NotificationHub::new();
        let online = Uuid::new_v4();
        let broken = Uuid::new_v4();
        let offline = Uuid::new_v4();

        let (online_conn, mut online_rx) = Connection::new(8);
        let (broken_conn, broken_rx) = Connection::new(8);
        hub.register(online_conn, online);
        hub.register(broken_conn, broken);
        drop(broken_rx);

        let delivered = hub.notify_order(&[offline, broken, online], &summary());

        assert_eq!(delivered, vec![online]);
        let payload = online_rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "order_notification");
        assert_eq!(value["data"]["order_id"], Uuid::from_u128(42).to_string());
    }
}
