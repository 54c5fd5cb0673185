use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;

use crate::api::rest::auth::Actor;
use crate::error::{AppError, KnownError};
use crate::models::profile::Profile;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/profiles", post(upsert_profile))
}

/// Seeds the profile directory used for push targets and driver details.
async fn upsert_profile(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<Profile>, JsonRejection>,
) -> Result<Json<Profile>, KnownError> {
    actor
        .require_admin()
        .map_err(|err| err.keyed("err.profile.update"))?;
    let Json(profile) =
        payload.map_err(|err| AppError::BadRequest(err.body_text()).keyed("err.profile.bind"))?;

    if profile.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()).keyed("err.profile.bind"));
    }

    Ok(Json(state.profiles.upsert(profile).await))
}
