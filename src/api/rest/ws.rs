use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::rest::drivers::{change_status, move_driver};
use crate::engine::assignment::{AssignOutcome, TakenReason};
use crate::engine::dispatch::{TAKEN_TEXT, accept_order, reject_order};
use crate::error::AppError;
use crate::models::driver::{ApprovalStatus, GeoPoint};
use crate::notify::message::{InboundMessage, OutboundMessage};
use crate::notify::Connection;
use crate::state::AppState;
use crate::store::DispatchStore;

#[derive(Deserialize)]
pub struct WsParams {
    pub driver_id: Uuid,
}

pub async fn ws_handler(
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    // Unknown or unapproved drivers are refused before any upgrade handling.
    let driver = state
        .store
        .driver(params.driver_id)?
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", params.driver_id)))?;

    if driver.approval != ApprovalStatus::Approved {
        return Err(AppError::Forbidden("driver not approved".to_string()));
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, driver.id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, driver_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, outbox) = Connection::new(state.connection_buffer_size);
    let connection_id = connection.id();
    let replies = connection.clone();
    let watchdog = connection.clone();

    if let Some(previous) = state.hub.register(connection, driver_id) {
        info!(driver_id = %driver_id, superseded = %previous, "driver reconnected");
    }

    let mut send_task = tokio::spawn(async move {
        let mut outbox = ReceiverStream::new(outbox);
        while let Some(payload) = outbox.next().await {
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            if let Some(reply) = handle_driver_message(&recv_state, driver_id, &text) {
                let payload = match serde_json::to_string(&reply) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(error = %err, "failed to serialize reply");
                        continue;
                    }
                };
                if replies.try_push(payload).is_err() {
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
        _ = watchdog.closed() => {
            info!(driver_id = %driver_id, "hub dropped connection; closing socket");
            send_task.abort();
            recv_task.abort();
        }
    }

    state.hub.unregister(connection_id);
}

/// Routes one inbound frame to the engine. Returns a direct reply, if any.
pub(crate) fn handle_driver_message(
    state: &AppState,
    driver_id: Uuid,
    text: &str,
) -> Option<OutboundMessage> {
    let message: InboundMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(driver_id = %driver_id, error = %err, "invalid driver message");
            return Some(OutboundMessage::error(
                "invalid_message_format",
                "Invalid message format",
            ));
        }
    };

    match message {
        InboundMessage::AcceptOrder { order_id } => match accept_order(state, order_id, driver_id) {
            // The hub already pushed the assignment to this driver.
            AssignOutcome::Assigned { .. } => None,
            AssignOutcome::AlreadyTaken(TakenReason::OrderUnavailable) => {
                Some(OutboundMessage::error("order_unavailable", TAKEN_TEXT))
            }
            AssignOutcome::AlreadyTaken(TakenReason::DriverUnavailable) => Some(
                OutboundMessage::error("driver_unavailable", "Driver must be available to accept orders"),
            ),
            AssignOutcome::PersistenceFailure(_) => Some(OutboundMessage::error(
                "internal_error",
                "Order could not be accepted, try again",
            )),
        },
        InboundMessage::RejectOrder { order_id, reason } => {
            info!(driver_id = %driver_id, order_id = %order_id, reason = ?reason, "driver declined offer");
            reject_order(state, order_id, driver_id)
                .err()
                .map(|err| OutboundMessage::error("internal_error", err.to_string()))
        }
        InboundMessage::UpdateStatus { status } => change_status(state, driver_id, status)
            .err()
            .map(|err| OutboundMessage::error("status_rejected", err.to_string())),
        InboundMessage::UpdateLocation { lat, lng } => move_driver(state, driver_id, GeoPoint::new(lat, lng))
            .err()
            .map(|err| OutboundMessage::error("location_rejected", err.to_string())),
    }
}
