use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{ApprovalStatus, Driver, DriverStatus, GeoPoint, VehicleClass};
use crate::state::AppState;
use crate::store::{DispatchStore, StatusChange};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/connected", get(list_connected_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/approval", patch(update_driver_approval))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/location", patch(update_driver_location))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub vehicle_class: VehicleClass,
}

#[derive(Deserialize)]
pub struct UpdateApprovalRequest {
    pub approval: ApprovalStatus,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("driver {id} not found"))
}

/// Availability change requested by the driver, over REST or the live channel.
pub(crate) fn change_status(
    state: &AppState,
    id: Uuid,
    status: DriverStatus,
) -> Result<Driver, AppError> {
    if status == DriverStatus::Busy {
        return Err(AppError::BadRequest(
            "busy is set by order assignment only".to_string(),
        ));
    }

    match state.store.set_driver_status(id, status)? {
        StatusChange::Changed(driver) => Ok(driver),
        StatusChange::NotFound => Err(not_found(id)),
        StatusChange::NotApproved => Err(AppError::Forbidden(
            "only approved drivers can change status".to_string(),
        )),
        StatusChange::HasActiveOrder => Err(AppError::Conflict(
            "driver has an active order".to_string(),
        )),
    }
}

pub(crate) fn move_driver(state: &AppState, id: Uuid, location: GeoPoint) -> Result<Driver, AppError> {
    if !location.is_valid() {
        return Err(AppError::BadRequest("coordinates out of range".to_string()));
    }

    state
        .store
        .set_driver_location(id, location, Utc::now())?
        .ok_or_else(|| not_found(id))
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let driver = Driver::new(payload.name, payload.vehicle_class);
    state.store.insert_driver(driver.clone())?;
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Driver>>, AppError> {
    Ok(Json(state.store.drivers()?))
}

async fn list_connected_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Uuid>> {
    Json(state.hub.connected_drivers())
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    state
        .store
        .driver(id)?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

async fn update_driver_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateApprovalRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .store
        .set_driver_approval(id, payload.approval)?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(driver_id = %id, approval = ?payload.approval, "driver approval recorded");
    Ok(Json(driver))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    change_status(&state, id, payload.status).map(Json)
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    move_driver(&state, id, payload.location).map(Json)
}
