use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::assignment::{AssignOutcome, TakenReason};
use crate::engine::dispatch::{ASSIGNED_TEXT, TAKEN_TEXT, accept_order, reject_order};
use crate::engine::queue::enqueue_order;
use crate::error::AppError;
use crate::models::offer::Offer;
use crate::models::order::{NewOrder, Order, OrderStatus};
use crate::state::AppState;
use crate::store::{DispatchStore, Transition};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/offers", get(list_offers))
        .route("/orders/:id/accept", post(accept))
        .route("/orders/:id/reject", post(reject))
        .route("/orders/:id/status", patch(update_order_status))
        .route("/orders/:id/cancel", post(cancel_order))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Deserialize)]
pub struct DriverActionRequest {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub driver_id: Uuid,
    pub status: OrderStatus,
}

#[derive(Serialize)]
pub struct AcceptResponse {
    pub assigned: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("order {id} not found"))
}

fn validate(payload: &NewOrder) -> Result<(), AppError> {
    if payload.customer_name.trim().is_empty() {
        return Err(AppError::BadRequest("customer_name cannot be empty".to_string()));
    }
    if !payload.pickup.is_valid() || !payload.delivery.is_valid() {
        return Err(AppError::BadRequest("coordinates out of range".to_string()));
    }
    if payload.weight_kg.is_some_and(|w| w < 0.0) || payload.value.is_some_and(|v| v < 0.0) {
        return Err(AppError::BadRequest("weight and value must be >= 0".to_string()));
    }
    Ok(())
}

pub(crate) fn accept_response(outcome: AssignOutcome) -> Result<AcceptResponse, AppError> {
    match outcome {
        AssignOutcome::Assigned { order, .. } => Ok(AcceptResponse {
            assigned: true,
            message: ASSIGNED_TEXT,
            order: Some(order),
        }),
        AssignOutcome::AlreadyTaken(TakenReason::OrderUnavailable) => Ok(AcceptResponse {
            assigned: false,
            message: TAKEN_TEXT,
            order: None,
        }),
        AssignOutcome::AlreadyTaken(TakenReason::DriverUnavailable) => Ok(AcceptResponse {
            assigned: false,
            message: "Driver must be approved and available to accept orders",
            order: None,
        }),
        AssignOutcome::PersistenceFailure(err) => Err(err.into()),
    }
}

fn transition_result(id: Uuid, transition: Transition) -> Result<Order, AppError> {
    match transition {
        Transition::Applied(order) => Ok(order),
        Transition::NotFound => Err(not_found(id)),
        Transition::NotAssignedToDriver => Err(AppError::Forbidden(format!(
            "order {id} is not assigned to this driver"
        ))),
        Transition::Invalid { from, to } => Err(AppError::Conflict(format!(
            "cannot move order from {from:?} to {to:?}"
        ))),
    }
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewOrder>,
) -> Result<Json<Order>, AppError> {
    validate(&payload)?;

    let order = state.dispatcher.open_order(payload).await?;
    enqueue_order(&state, order.clone()).await?;

    Ok(Json(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.store.orders(query.status)?))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    state
        .store
        .order(id)?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

async fn list_offers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Offer>>, AppError> {
    if state.store.order(id)?.is_none() {
        return Err(not_found(id));
    }
    Ok(Json(state.store.offers_for_order(id)?))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverActionRequest>,
) -> Result<Json<AcceptResponse>, AppError> {
    accept_response(accept_order(&state, id, payload.driver_id)).map(Json)
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverActionRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    reject_order(&state, id, payload.driver_id)?;
    Ok(Json(MessageResponse {
        message: "Order rejected",
    }))
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let transition = state.dispatcher.advance(id, payload.driver_id, payload.status)?;
    transition_result(id, transition).map(Json)
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let transition = state.dispatcher.cancel(id)?;
    let order = transition_result(id, transition)?;
    Ok(Json(order))
}
