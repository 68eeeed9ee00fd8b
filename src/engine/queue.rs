use tracing::error;

use crate::error::AppError;
use crate::models::order::Order;
use crate::state::AppState;

/// Hands a freshly opened order to the dispatch loop.
pub async fn enqueue_order(state: &AppState, order: Order) -> Result<(), AppError> {
    let order_id = order.id;

    // Counted first: the loop may receive and decrement before `send` returns.
    state.metrics.orders_in_queue.inc();
    if state.order_tx.send(order).await.is_err() {
        state.metrics.orders_in_queue.dec();
        error!(order_id = %order_id, "dispatch queue closed; order not queued");
        return Err(AppError::Unavailable("dispatch queue is closed".to_string()));
    }

    Ok(())
}
