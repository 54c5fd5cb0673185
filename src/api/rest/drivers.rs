use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::auth::Actor;
use crate::engine::locator;
use crate::error::{AppError, KnownError};
use crate::models::driver::{DriverLocationRecord, DriverLocationUpdate, DriverStatus};
use crate::models::profile::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/update/location", post(update_location))
        .route("/drivers/:id/location", get(get_location))
        .route("/drivers/:id/status", patch(update_status))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

/// Drivers may only speak for themselves.
fn ensure_self(actor: &Actor, driver_id: Uuid, key: &'static str) -> Result<(), KnownError> {
    actor.require(&[Role::Driver]).map_err(|err| err.keyed(key))?;
    if !actor.is_admin() && actor.id != driver_id {
        return Err(AppError::Forbidden(format!(
            "driver {} cannot act for driver {driver_id}",
            actor.id
        ))
        .keyed(key));
    }
    Ok(())
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<DriverLocationUpdate>, JsonRejection>,
) -> Result<Json<DriverLocationRecord>, KnownError> {
    let Json(update) = payload.map_err(|err| {
        AppError::BadRequest(err.body_text()).keyed("err.driverLocation.bind")
    })?;
    ensure_self(&actor, update.driver_id, "err.driverLocation.update")?;

    let record = locator::upsert_location(&state, update)
        .await
        .map_err(|err| err.keyed("err.driverLocation.update"))?;

    Ok(Json(record))
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverLocationRecord>, KnownError> {
    let record = locator::location(&state, id)
        .await
        .map_err(|err| err.keyed("err.driverLocation.read"))?;
    Ok(Json(record))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<DriverLocationRecord>, KnownError> {
    let Json(request) = payload.map_err(|err| {
        AppError::BadRequest(err.body_text()).keyed("err.driverLocation.bind")
    })?;
    ensure_self(&actor, id, "err.driverLocation.update")?;

    let record = locator::set_status(&state, id, request.status)
        .await
        .map_err(|err| err.keyed("err.driverLocation.update"))?;

    Ok(Json(record))
}
