pub mod auth;
pub mod drivers;
pub mod orders;
pub mod profiles;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::rest::auth::Actor;
use crate::error::KnownError;
use crate::models::notification::DeadLetter;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(orders::router())
        .merge(drivers::router())
        .merge(profiles::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/notifications/dead-letters", get(dead_letters))
        .route("/ws/business/:id", get(ws::business_feed))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    orders: usize,
    drivers: usize,
    dead_letters: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        orders: state.orders.count().await,
        drivers: state.drivers.count().await,
        dead_letters: state.dead_letters.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

/// Newest failures first.
async fn dead_letters(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<DeadLetter>>, KnownError> {
    actor
        .require_admin()
        .map_err(|err| err.keyed("err.notifications.read"))?;

    let mut letters: Vec<DeadLetter> = state
        .dead_letters
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    letters.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));

    Ok(Json(letters))
}
