use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::assignment::AssignOutcome;
use crate::models::order::{Order, OrderStatus};
use crate::notify::message::OrderSummary;
use crate::state::AppState;
use crate::store::{DispatchStore, StoreError};

pub const ASSIGNED_TEXT: &str = "Order assigned successfully";
pub const TAKEN_TEXT: &str = "Order no longer available";

pub async fn run_dispatch_engine(state: Arc<AppState>, mut order_rx: mpsc::Receiver<Order>) {
    info!("dispatch engine started");

    while let Some(order) = order_rx.recv().await {
        state.metrics.orders_in_queue.dec();
        // Route lookups can take seconds; one slow order must not hold up the queue.
        tokio::spawn(dispatch_order(state.clone(), order));
    }

    warn!("dispatch engine stopped: queue channel closed");
}

/// Ranks candidates for a freshly opened order and pushes the offer to them.
pub async fn dispatch_order(state: Arc<AppState>, order: Order) {
    let start = Instant::now();

    let outcome = match offer_order(&state, &order).await {
        Ok(0) => "no_coverage",
        Ok(_) => "covered",
        Err(err) => {
            error!(order_id = %order.id, error = %err, "candidate selection failed");
            "error"
        }
    };

    state
        .metrics
        .candidate_selection_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
}

async fn offer_order(state: &AppState, order: &Order) -> Result<usize, StoreError> {
    let current = state.store.order(order.id)?;
    if current.is_none_or(|current| current.status != OrderStatus::Pending) {
        info!(order_id = %order.id, "order left pending before dispatch; skipping");
        return Ok(0);
    }

    let candidates = state.dispatcher.select_candidates(order).await?;
    if candidates.is_empty() {
        return Ok(0);
    }

    for candidate in &candidates {
        state
            .metrics
            .route_estimates_total
            .with_label_values(&[candidate.source.label()])
            .inc();
    }

    let driver_ids: Vec<Uuid> = candidates.iter().map(|c| c.driver_id).collect();
    let delivered = state.hub.notify_order(&driver_ids, &OrderSummary::from(order));

    let dropped = driver_ids.len() - delivered.len();
    state
        .metrics
        .offers_total
        .with_label_values(&["delivered"])
        .inc_by(delivered.len() as u64);
    state
        .metrics
        .offers_total
        .with_label_values(&["dropped"])
        .inc_by(dropped as u64);

    info!(
        order_id = %order.id,
        offered = driver_ids.len(),
        delivered = delivered.len(),
        "order offered"
    );
    Ok(candidates.len())
}

/// Runs the atomic assignment and tells the winner and the expired drivers.
pub fn accept_order(state: &AppState, order_id: Uuid, driver_id: Uuid) -> AssignOutcome {
    let outcome = state.dispatcher.try_assign(order_id, driver_id);
    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome.label()])
        .inc();

    if let AssignOutcome::Assigned { expired, .. } = &outcome {
        state
            .hub
            .notify_status(driver_id, order_id, OrderStatus::Assigned, ASSIGNED_TEXT);
        for other in expired {
            state
                .hub
                .notify_status(*other, order_id, OrderStatus::Assigned, TAKEN_TEXT);
        }
    }

    outcome
}

pub fn reject_order(state: &AppState, order_id: Uuid, driver_id: Uuid) -> Result<(), StoreError> {
    state.dispatcher.reject(order_id, driver_id)
}
