use crate::error::AppError;
use crate::models::order::{OrderStatus, TripStatus};

/// Allowed moves of the business-facing machine.
pub fn order_allows(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    if from == to {
        return true;
    }

    match from {
        Requested => matches!(to, Accepted | Declined | Cancelled),
        Accepted => matches!(to, Prepared | Completed | Cancelled),
        Prepared => matches!(to, Completed | Cancelled),
        Declined | Cancelled | Completed => false,
    }
}

/// Allowed moves of the delivery machine. `Declined` only leads back to
/// `Requested` so the business can hand the trip to another driver.
pub fn trip_allows(from: TripStatus, to: TripStatus) -> bool {
    use TripStatus::*;

    if from == to {
        return true;
    }

    match (from, to) {
        (None, Requested) => true,
        (Requested, Accepted) => true,
        (Accepted, Confirmed) => true,
        (Confirmed, Started) => true,
        (Started, Arrived) => true,
        (Arrived, Dropped) => true,
        (Dropped, Completed) => true,
        (Requested | Accepted | Confirmed | Started | Arrived | Dropped, Declined | Cancelled) => {
            true
        }
        (Declined, Requested) => true,
        _ => false,
    }
}

pub fn check_order(from: OrderStatus, to: OrderStatus) -> Result<(), AppError> {
    if order_allows(from, to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "order status cannot move from {from:?} to {to:?}"
        )))
    }
}

pub fn check_trip(from: TripStatus, to: TripStatus) -> Result<(), AppError> {
    if trip_allows(from, to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "trip status cannot move from {from:?} to {to:?}"
        )))
    }
}
