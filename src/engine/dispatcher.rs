//! Sole writer of order status fields.
//!
//! Every mutation runs as one atomic store update; notification commands are
//! queued only after that update has committed, and never block the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::queue::enqueue_notification;
use crate::engine::transitions::{check_order, check_trip};
use crate::error::AppError;
use crate::geo;
use crate::models::notification::{NotifyCommand, NotifyEvent};
use crate::models::order::{DeliveryAddress, LineItem, Order, OrderStatus, TripStatus};
use crate::state::AppState;
use crate::store::OrderUpdate;

const ORDER_NUMBER_LEN: usize = 6;
const ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub order_id: Uuid,
    pub order_status: Option<OrderStatus>,
    pub trip_status: Option<TripStatus>,
    pub reason_code: Option<u32>,
    pub driver_id: Option<Uuid>,
    /// When set, the write only applies if the stored version still matches.
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub event: NotifyEvent,
    /// False when the status was re-applied with its current value, unless a
    /// trip request moved to another driver.
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub order: Order,
    pub changes: Vec<StatusChange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub business_id: Uuid,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub tax: f64,
    #[serde(default)]
    pub booking_fee: f64,
    pub delivery_address: DeliveryAddress,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub recipient: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderContentUpdate {
    pub items: Option<Vec<LineItem>>,
    pub tax: Option<f64>,
    pub booking_fee: Option<f64>,
    pub delivery_address: Option<DeliveryAddress>,
    pub instruction: Option<String>,
    pub recipient: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub order_id: Uuid,
    pub business_rate: f64,
    #[serde(default)]
    pub business_feedback: String,
    pub driver_rate: f64,
    #[serde(default)]
    pub driver_feedback: String,
}

pub async fn create_order(
    state: &AppState,
    customer_id: Uuid,
    new_order: NewOrder,
) -> Result<Order, AppError> {
    validate_items(&new_order.items)?;
    validate_charges(new_order.tax, new_order.booking_fee)?;
    validate_address(&new_order.delivery_address)?;

    let now = Utc::now();
    let mut order = Order {
        id: Uuid::new_v4(),
        number: String::new(),
        customer_id,
        business_id: new_order.business_id,
        driver_id: None,
        items: new_order.items,
        price: 0.0,
        tax: new_order.tax,
        booking_fee: new_order.booking_fee,
        total: 0.0,
        delivery_address: new_order.delivery_address,
        instruction: new_order.instruction,
        recipient: new_order.recipient,
        order_status: OrderStatus::Requested,
        trip_status: TripStatus::None,
        status_history: BTreeMap::from([(
            OrderStatus::Requested.event_name().to_string(),
            now,
        )]),
        reason_code: None,
        pickup_score: None,
        rated: false,
        business_rate: None,
        business_feedback: None,
        driver_rate: None,
        driver_feedback: None,
        version: 1,
        created_at: now,
        updated_at: now,
    };
    order.reprice();

    let mut last_err = None;
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        order.number = generate_order_number();
        match state.orders.insert(order.clone()).await {
            Ok(created) => {
                info!(order_id = %created.id, number = %created.number, "order created");
                notify(state, &created, NotifyEvent::Order(OrderStatus::Requested));
                return Ok(created);
            }
            Err(AppError::Conflict(msg)) => {
                warn!(number = %order.number, "order number collision; regenerating");
                last_err = Some(AppError::Conflict(msg));
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err.unwrap_or_else(|| AppError::Internal("order number generation failed".into())))
}

/// Validates and commits a status change on either machine, then schedules
/// the notifications for every field whose value actually changed.
pub async fn request_transition(
    state: &AppState,
    request: TransitionRequest,
) -> Result<Transition, AppError> {
    if request.order_status.is_none() && request.trip_status.is_none() {
        return Err(AppError::BadRequest(
            "either orderStatus or tripStatus is required".to_string(),
        ));
    }

    let order_id = request.order_id;
    let machine = match (request.order_status, request.trip_status) {
        (Some(_), Some(_)) => "both",
        (Some(_), None) => "order",
        _ => "trip",
    };

    let result = state
        .orders
        .update(
            order_id,
            Box::new(move |order: &mut Order| {
                check_version(order, request.expected_version)?;

                if let Some(next) = request.trip_status {
                    if order.order_status.is_terminal() {
                        return Err(AppError::OrderClosed(format!(
                            "order {} is {:?}; trip cannot move to {next:?}",
                            order.id, order.order_status
                        )));
                    }
                    check_trip(order.trip_status, next)?;
                    if next == TripStatus::Requested
                        && request.driver_id.or(order.driver_id).is_none()
                    {
                        return Err(AppError::BadRequest(
                            "driverId is required to request a trip".to_string(),
                        ));
                    }
                }
                if let Some(next) = request.order_status {
                    check_order(order.order_status, next)?;
                }

                let now = commit_time(order);
                if let Some(next) = request.order_status {
                    set_order_status(order, next, now);
                }
                if let Some(next) = request.trip_status {
                    set_trip_status(order, next, now);
                }
                if let Some(code) = request.reason_code {
                    order.reason_code = Some(code);
                }
                if let Some(driver_id) = request.driver_id {
                    order.driver_id = Some(driver_id);
                }
                touch(order, now);
                Ok(())
            }),
        )
        .await;

    let update = match result {
        Ok(update) => update,
        Err(err) => {
            state
                .metrics
                .transitions_total
                .with_label_values(&[machine, "rejected"])
                .inc();
            warn!(order_id = %order_id, error = %err, "transition rejected");
            return Err(err);
        }
    };

    state
        .metrics
        .transitions_total
        .with_label_values(&[machine, "committed"])
        .inc();

    let changes = status_changes(&update, request.order_status, request.trip_status);
    info!(
        order_id = %order_id,
        order_status = ?update.current.order_status,
        trip_status = ?update.current.trip_status,
        version = update.current.version,
        "transition committed"
    );

    for change in changes.iter().filter(|change| change.changed) {
        notify(state, &update.current, change.event);
    }

    Ok(Transition {
        order: update.current,
        changes,
    })
}

/// Assigns a driver and asks them to take the trip.
pub async fn request_trip(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    expected_version: Option<u64>,
) -> Result<Transition, AppError> {
    request_transition(
        state,
        TransitionRequest {
            order_id,
            trip_status: Some(TripStatus::Requested),
            driver_id: Some(driver_id),
            expected_version,
            ..TransitionRequest::default()
        },
    )
    .await
}

/// Stores the customer's ratings and closes the order as completed.
pub async fn submit_rating(
    state: &AppState,
    customer_id: Uuid,
    rating: Rating,
) -> Result<Transition, AppError> {
    validate_rate("businessRate", rating.business_rate)?;
    validate_rate("driverRate", rating.driver_rate)?;

    let order_id = rating.order_id;
    let update = state
        .orders
        .update(
            order_id,
            Box::new(move |order: &mut Order| {
                if order.customer_id != customer_id {
                    return Err(AppError::Forbidden(format!(
                        "order {} belongs to another customer",
                        order.id
                    )));
                }
                check_order(order.order_status, OrderStatus::Completed)?;

                let now = commit_time(order);
                set_order_status(order, OrderStatus::Completed, now);
                order.rated = true;
                order.business_rate = Some(rating.business_rate);
                order.business_feedback = Some(rating.business_feedback);
                order.driver_rate = Some(rating.driver_rate);
                order.driver_feedback = Some(rating.driver_feedback);
                touch(order, now);
                Ok(())
            }),
        )
        .await?;

    state
        .metrics
        .transitions_total
        .with_label_values(&["order", "committed"])
        .inc();
    info!(order_id = %order_id, "order rated");

    let changes = status_changes(&update, Some(OrderStatus::Completed), None);
    for change in changes.iter().filter(|change| change.changed) {
        notify(state, &update.current, change.event);
    }

    Ok(Transition {
        order: update.current,
        changes,
    })
}

pub async fn record_pickup_score(
    state: &AppState,
    order_id: Uuid,
    score: u8,
) -> Result<Order, AppError> {
    if score > 5 {
        return Err(AppError::BadRequest(
            "pickupScore must be between 0 and 5".to_string(),
        ));
    }

    let update = state
        .orders
        .update(
            order_id,
            Box::new(move |order: &mut Order| {
                let now = commit_time(order);
                order.pickup_score = Some(score);
                touch(order, now);
                Ok(())
            }),
        )
        .await?;

    Ok(update.current)
}

/// Edits the order's content. Only allowed before the business has answered.
pub async fn update_content(
    state: &AppState,
    order_id: Uuid,
    content: OrderContentUpdate,
) -> Result<Order, AppError> {
    if let Some(items) = &content.items {
        validate_items(items)?;
    }
    validate_charges(content.tax.unwrap_or(0.0), content.booking_fee.unwrap_or(0.0))?;
    if let Some(address) = &content.delivery_address {
        validate_address(address)?;
    }

    let update = state
        .orders
        .update(
            order_id,
            Box::new(move |order: &mut Order| {
                if order.order_status != OrderStatus::Requested {
                    return Err(AppError::Conflict(format!(
                        "order {} can no longer be edited ({:?})",
                        order.id, order.order_status
                    )));
                }

                if let Some(items) = content.items {
                    order.items = items;
                }
                if let Some(tax) = content.tax {
                    order.tax = tax;
                }
                if let Some(fee) = content.booking_fee {
                    order.booking_fee = fee;
                }
                if let Some(address) = content.delivery_address {
                    order.delivery_address = address;
                }
                if let Some(instruction) = content.instruction {
                    order.instruction = instruction;
                }
                if let Some(recipient) = content.recipient {
                    order.recipient = recipient;
                }
                order.reprice();

                let now = commit_time(order);
                touch(order, now);
                Ok(())
            }),
        )
        .await?;

    Ok(update.current)
}

fn check_version(order: &Order, expected: Option<u64>) -> Result<(), AppError> {
    match expected {
        Some(expected) if expected != order.version => Err(AppError::Conflict(format!(
            "order {} is at version {}, expected {expected}",
            order.id, order.version
        ))),
        _ => Ok(()),
    }
}

/// Never earlier than the order's last modification, so history timestamps
/// stay monotonic even when clocks race between writers.
fn commit_time(order: &Order) -> DateTime<Utc> {
    Utc::now().max(order.updated_at)
}

fn set_order_status(order: &mut Order, next: OrderStatus, now: DateTime<Utc>) {
    order.order_status = next;
    order
        .status_history
        .insert(next.event_name().to_string(), now);
}

fn set_trip_status(order: &mut Order, next: TripStatus, now: DateTime<Utc>) {
    order.trip_status = next;
    order
        .status_history
        .insert(next.event_name().to_string(), now);
}

fn touch(order: &mut Order, now: DateTime<Utc>) {
    order.version += 1;
    order.updated_at = now;
}

fn status_changes(
    update: &OrderUpdate,
    order_status: Option<OrderStatus>,
    trip_status: Option<TripStatus>,
) -> Vec<StatusChange> {
    let mut changes = Vec::with_capacity(2);
    if let Some(next) = order_status {
        changes.push(StatusChange {
            event: NotifyEvent::Order(next),
            changed: update.previous.order_status != next,
        });
    }
    if let Some(next) = trip_status {
        // A re-request to another driver is news for that driver.
        let reassigned = next == TripStatus::Requested
            && update.previous.driver_id != update.current.driver_id;
        changes.push(StatusChange {
            event: NotifyEvent::Trip(next),
            changed: update.previous.trip_status != next || reassigned,
        });
    }
    changes
}

fn notify(state: &AppState, order: &Order, event: NotifyEvent) {
    enqueue_notification(
        state,
        NotifyCommand {
            order_id: order.id,
            customer_id: order.customer_id,
            business_id: order.business_id,
            driver_id: order.driver_id,
            event,
        },
    );
}

fn generate_order_number() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ORDER_NUMBER_LEN)
        .map(|byte| char::from(byte).to_ascii_uppercase())
        .collect()
}

fn validate_items(items: &[LineItem]) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::BadRequest(
            "order needs at least one item".to_string(),
        ));
    }
    for item in items {
        if item.quantity == 0 {
            return Err(AppError::BadRequest(format!(
                "item {} has zero quantity",
                item.name
            )));
        }
        if !item.price.is_finite() || item.price < 0.0 {
            return Err(AppError::BadRequest(format!(
                "item {} has an invalid price",
                item.name
            )));
        }
    }
    Ok(())
}

fn validate_charges(tax: f64, booking_fee: f64) -> Result<(), AppError> {
    if !tax.is_finite() || tax < 0.0 || !booking_fee.is_finite() || booking_fee < 0.0 {
        return Err(AppError::BadRequest(
            "tax and bookingFee must be non-negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_address(address: &DeliveryAddress) -> Result<(), AppError> {
    if !geo::is_valid(&address.location) {
        return Err(AppError::BadRequest(
            "delivery location is out of range".to_string(),
        ));
    }
    Ok(())
}

fn validate_rate(field: &str, rate: f64) -> Result<(), AppError> {
    if !(0.0..=5.0).contains(&rate) {
        return Err(AppError::BadRequest(format!(
            "{field} must be between 0 and 5"
        )));
    }
    Ok(())
}
