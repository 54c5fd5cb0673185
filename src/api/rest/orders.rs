use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::rest::auth::Actor;
use crate::engine::dispatcher::{
    self, NewOrder, OrderContentUpdate, Rating, TransitionRequest,
};
use crate::engine::locator::find_nearby_drivers;
use crate::error::{AppError, KnownError};
use crate::models::driver::{GeoPoint, NearbyDriver};
use crate::models::order::{Order, OrderStatus, TripStatus};
use crate::models::profile::Role;
use crate::state::AppState;
use crate::store::{OrderFilter, OrderPage, SortField};

const UNRATED_WINDOW_DAYS: i64 = 7;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/unrated", get(list_unrated_orders))
        .route(
            "/orders/:id",
            get(get_order).put(update_order).delete(delete_order),
        )
        .route("/orders/business/process", post(process_order_for_business))
        .route("/orders/trip/process", post(process_trip_for_driver))
        .route("/orders/trip/nearDrivers", get(near_drivers))
        .route("/orders/trip/request", post(request_trip_to_driver))
        .route("/orders/trip/pickup", post(submit_pickup_score))
        .route("/orders/submit/by/user", post(submit_order_by_user))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Only honoured for admins; customers always order for themselves.
    pub customer_id: Option<Uuid>,
    #[serde(flatten)]
    pub order: NewOrder,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOrderRequest {
    pub order_id: Uuid,
    pub order_status: OrderStatus,
    pub reason_code: Option<u32>,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTripRequest {
    pub order_id: Uuid,
    pub trip_status: TripStatus,
    pub reason_code: Option<u32>,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRequest {
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupScoreRequest {
    pub order_id: Uuid,
    pub pickup_score: u8,
}

#[derive(Deserialize)]
pub struct NearDriversQuery {
    pub lat: f64,
    pub lng: f64,
    pub limit: Option<usize>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub query: Option<String>,
    pub offset: Option<usize>,
    pub count: Option<usize>,
    pub field: Option<SortField>,
    /// 1 ascending, -1 descending.
    pub sort: Option<i8>,
    pub business_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub is_past: Option<bool>,
    pub is_upcoming: Option<bool>,
    /// 1 not rated, 2 rated.
    pub rated: Option<u8>,
}

fn bind<T>(payload: Result<Json<T>, JsonRejection>, key: &'static str) -> Result<T, KnownError> {
    payload
        .map(|Json(value)| value)
        .map_err(|err| AppError::BadRequest(err.body_text()).keyed(key))
}

/// Loads an order the actor is a party to. Admins see every order.
async fn load_visible(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    key: &'static str,
) -> Result<Order, KnownError> {
    let order = state
        .orders
        .get(order_id)
        .await
        .map_err(|err| err.keyed(key))?;

    let visible = match actor.role {
        Role::Admin => true,
        Role::Customer => order.customer_id == actor.id,
        Role::Business => order.business_id == actor.id,
        Role::Driver => order.driver_id == Some(actor.id),
    };

    if visible {
        Ok(order)
    } else {
        Err(AppError::Forbidden(format!("order {order_id} is not yours")).keyed(key))
    }
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<Order>, KnownError> {
    actor
        .require(&[Role::Customer])
        .map_err(|err| err.keyed("err.order.create"))?;
    let request = bind(payload, "err.order.bind")?;

    let customer_id = match (actor.role, request.customer_id) {
        (Role::Admin, Some(customer_id)) => customer_id,
        (Role::Admin, None) => {
            return Err(AppError::BadRequest("customerId is required".to_string())
                .keyed("err.order.bind"));
        }
        _ => actor.id,
    };

    let order = dispatcher::create_order(&state, customer_id, request.order)
        .await
        .map_err(|err| err.keyed("err.order.create"))?;

    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, KnownError> {
    let order = load_visible(&state, &actor, id, "err.order.read").await?;
    Ok(Json(order))
}

async fn update_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    payload: Result<Json<OrderContentUpdate>, JsonRejection>,
) -> Result<Json<Order>, KnownError> {
    actor
        .require(&[Role::Customer])
        .map_err(|err| err.keyed("err.order.update"))?;
    let content = bind(payload, "err.order.bind")?;
    load_visible(&state, &actor, id, "err.order.update").await?;

    let order = dispatcher::update_content(&state, id, content)
        .await
        .map_err(|err| err.keyed("err.order.update"))?;

    Ok(Json(order))
}

async fn delete_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, KnownError> {
    actor
        .require_admin()
        .map_err(|err| err.keyed("err.order.delete"))?;

    state
        .orders
        .delete(id)
        .await
        .map_err(|err| err.keyed("err.order.delete"))?;

    Ok(Json(json!({ "status": "Order is deleted correctly." })))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<OrderPage>, KnownError> {
    let Query(query) =
        query.map_err(|err| AppError::BadRequest(err.body_text()).keyed("err.order.bind"))?;

    let mut filter = OrderFilter {
        business_id: query.business_id,
        customer_id: query.customer_id,
        driver_id: query.driver_id,
        status: query.status,
        past: query.is_past.unwrap_or(false),
        upcoming: query.is_upcoming.unwrap_or(false),
        rated: match query.rated {
            Some(1) => Some(false),
            Some(2) => Some(true),
            _ => None,
        },
        query: query.query,
        updated_since: None,
        sort: query.field.unwrap_or_default(),
        descending: query.sort == Some(-1),
        offset: query.offset.unwrap_or(0),
        count: query.count.unwrap_or(0),
    };

    match actor.role {
        Role::Admin => {}
        Role::Customer => filter.customer_id = Some(actor.id),
        Role::Business => filter.business_id = Some(actor.id),
        Role::Driver => filter.driver_id = Some(actor.id),
    }

    let page = state
        .orders
        .list(&filter)
        .await
        .map_err(|err| err.keyed("err.order.read"))?;

    Ok(Json(page))
}

async fn list_unrated_orders(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Order>>, KnownError> {
    actor
        .require(&[Role::Customer])
        .map_err(|err| err.keyed("err.order.read"))?;

    let filter = OrderFilter {
        customer_id: Some(actor.id),
        rated: Some(false),
        updated_since: Some(Utc::now() - Duration::days(UNRATED_WINDOW_DAYS)),
        ..OrderFilter::default()
    };

    let page = state
        .orders
        .list(&filter)
        .await
        .map_err(|err| err.keyed("err.order.read"))?;

    Ok(Json(page.items))
}

async fn process_order_for_business(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<ProcessOrderRequest>, JsonRejection>,
) -> Result<Json<Order>, KnownError> {
    actor
        .require(&[Role::Business])
        .map_err(|err| err.keyed("err.order.update"))?;
    let request = bind(payload, "err.order.bind")?;
    load_visible(&state, &actor, request.order_id, "err.order.update").await?;

    let transition = dispatcher::request_transition(
        &state,
        TransitionRequest {
            order_id: request.order_id,
            order_status: Some(request.order_status),
            reason_code: request.reason_code,
            expected_version: request.expected_version,
            ..TransitionRequest::default()
        },
    )
    .await
    .map_err(|err| err.keyed("err.order.update"))?;

    Ok(Json(transition.order))
}

async fn process_trip_for_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<ProcessTripRequest>, JsonRejection>,
) -> Result<Json<Order>, KnownError> {
    actor
        .require(&[Role::Driver])
        .map_err(|err| err.keyed("err.order.update"))?;
    let request = bind(payload, "err.order.bind")?;

    if request.trip_status == TripStatus::Requested && !actor.is_admin() {
        return Err(AppError::Forbidden(
            "trips are requested by the business".to_string(),
        )
        .keyed("err.order.update"));
    }
    load_visible(&state, &actor, request.order_id, "err.order.update").await?;

    let transition = dispatcher::request_transition(
        &state,
        TransitionRequest {
            order_id: request.order_id,
            trip_status: Some(request.trip_status),
            reason_code: request.reason_code,
            expected_version: request.expected_version,
            ..TransitionRequest::default()
        },
    )
    .await
    .map_err(|err| err.keyed("err.order.update"))?;

    Ok(Json(transition.order))
}

async fn near_drivers(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    query: Result<Query<NearDriversQuery>, QueryRejection>,
) -> Result<Json<Vec<NearbyDriver>>, KnownError> {
    let Query(query) =
        query.map_err(|err| AppError::BadRequest(err.body_text()).keyed("err.drivers.bind"))?;

    let point = GeoPoint {
        lat: query.lat,
        lng: query.lng,
    };
    if !crate::geo::is_valid(&point) {
        return Err(AppError::BadRequest("coordinate out of range".to_string())
            .keyed("err.drivers.bind"));
    }

    let limit = query
        .limit
        .unwrap_or(state.config.search.near_drivers_limit)
        .max(1);
    let search = find_nearby_drivers(&state, point, limit).await;

    match search.last_error {
        Some(err) if search.drivers.is_empty() => {
            Err(AppError::Persistence(err).keyed("err.drivers.read"))
        }
        _ => Ok(Json(search.drivers)),
    }
}

async fn request_trip_to_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<TripRequest>, JsonRejection>,
) -> Result<Json<Order>, KnownError> {
    actor
        .require(&[Role::Business])
        .map_err(|err| err.keyed("err.order.update"))?;
    let request = bind(payload, "err.order.bind")?;
    load_visible(&state, &actor, request.order_id, "err.order.update").await?;

    let transition = dispatcher::request_trip(
        &state,
        request.order_id,
        request.driver_id,
        request.expected_version,
    )
    .await
    .map_err(|err| err.keyed("err.order.update"))?;

    Ok(Json(transition.order))
}

async fn submit_pickup_score(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<PickupScoreRequest>, JsonRejection>,
) -> Result<Json<Order>, KnownError> {
    let request = bind(payload, "err.order.bind")?;
    load_visible(&state, &actor, request.order_id, "err.order.update").await?;

    let order = dispatcher::record_pickup_score(&state, request.order_id, request.pickup_score)
        .await
        .map_err(|err| err.keyed("err.order.update"))?;

    Ok(Json(order))
}

async fn submit_order_by_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<Rating>, JsonRejection>,
) -> Result<Json<Order>, KnownError> {
    if actor.role != Role::Customer {
        return Err(
            AppError::Forbidden("only the customer can rate an order".to_string())
                .keyed("err.order.update"),
        );
    }
    let rating = bind(payload, "err.order.bind")?;

    let transition = dispatcher::submit_rating(&state, actor.id, rating)
        .await
        .map_err(|err| err.keyed("err.order.update"))?;

    Ok(Json(transition.order))
}
