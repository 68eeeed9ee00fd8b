use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::engine::assignment::AssignmentService;
use crate::error::AppError;
use crate::geo::osrm::OsrmClient;
use crate::models::order::Order;
use crate::notify::NotificationHub;
use crate::observability::metrics::Metrics;
use crate::store::MemoryStore;

pub type Dispatcher = AssignmentService<MemoryStore, OsrmClient>;

/// Every long-lived component, built once at startup and shared by handlers.
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub dispatcher: Dispatcher,
    pub hub: NotificationHub,
    pub order_tx: mpsc::Sender<Order>,
    pub metrics: Metrics,
    pub connection_buffer_size: usize,
}

impl AppState {
    pub fn new(config: &Config) -> Result<(Self, mpsc::Receiver<Order>), AppError> {
        let (order_tx, order_rx) = mpsc::channel(config.order_queue_size);
        let oracle = OsrmClient::new(&config.osrm_base_url, config.osrm_timeout())
            .map_err(|err| AppError::Internal(format!("failed to build routing client: {err}")))?;
        let store = Arc::new(MemoryStore::new());
        let metrics = Metrics::new();
        let hub = NotificationHub::with_gauge(metrics.connected_drivers.clone());

        Ok((
            Self {
                dispatcher: AssignmentService::new(store.clone(), oracle, config.dispatch_settings()),
                store,
                hub,
                order_tx,
                metrics,
                connection_buffer_size: config.connection_buffer_size,
            },
            order_rx,
        ))
    }
}
