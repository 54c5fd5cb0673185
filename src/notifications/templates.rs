//! Status to notification routing.
//!
//! Both functions below match exhaustively, so a new status variant does not
//! compile until it is given a route.

use std::collections::BTreeMap;

use crate::models::notification::{
    Delivery, NotificationData, NotifyCommand, NotifyEvent, PushApp, Recipient,
};
use crate::models::order::{OrderStatus, TripStatus};
use crate::notifications::error::NotifyError;

const LOCALE: &str = "en";

#[derive(Debug, Clone)]
pub struct AppNames {
    pub customer: String,
    pub driver: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    Customer,
    Driver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Nothing,
    Business,
    Push(Audience, &'static str),
    PushAndBusiness(Audience, &'static str),
}

fn order_route(status: OrderStatus) -> Route {
    match status {
        OrderStatus::Requested => Route::Business,
        OrderStatus::Accepted => Route::Push(Audience::Customer, "Your order is accepted."),
        OrderStatus::Declined => Route::Push(Audience::Customer, "Your order is declined."),
        OrderStatus::Cancelled => Route::Push(Audience::Customer, "Your order is cancelled."),
        OrderStatus::Prepared => Route::Push(Audience::Customer, "Your order is preparing."),
        OrderStatus::Completed => Route::Business,
    }
}

fn trip_route(status: TripStatus) -> Route {
    match status {
        TripStatus::None => Route::Nothing,
        TripStatus::Requested => Route::Push(Audience::Driver, "New trip is requested."),
        TripStatus::Accepted | TripStatus::Declined | TripStatus::Cancelled => Route::Business,
        TripStatus::Confirmed => {
            Route::PushAndBusiness(Audience::Customer, "Your order trip is confirmed.")
        }
        TripStatus::Started => {
            Route::PushAndBusiness(Audience::Customer, "Your order trip is started.")
        }
        TripStatus::Arrived => {
            Route::PushAndBusiness(Audience::Customer, "Your order trip is arrived.")
        }
        TripStatus::Dropped => {
            Route::PushAndBusiness(Audience::Customer, "Your order trip is dropped.")
        }
        TripStatus::Completed => {
            Route::PushAndBusiness(Audience::Customer, "Your order trip is completed.")
        }
    }
}

/// Expands a command into the deliveries it requires.
pub fn compose(command: &NotifyCommand, apps: &AppNames) -> Result<Vec<Delivery>, NotifyError> {
    let (route, kind) = match command.event {
        NotifyEvent::Order(status) => (order_route(status), status.event_name()),
        NotifyEvent::Trip(status) => (trip_route(status), status.event_name()),
    };

    let data = NotificationData {
        kind: kind.to_string(),
        order_id: command.order_id,
    };

    let business = || Delivery::Realtime {
        channel: command.business_id.to_string(),
        data: data.clone(),
    };

    let deliveries = match route {
        Route::Nothing => Vec::new(),
        Route::Business => vec![business()],
        Route::Push(audience, body) => vec![push(command, apps, audience, body, &data)?],
        Route::PushAndBusiness(audience, body) => {
            vec![push(command, apps, audience, body, &data)?, business()]
        }
    };

    Ok(deliveries)
}

fn push(
    command: &NotifyCommand,
    apps: &AppNames,
    audience: Audience,
    body: &str,
    data: &NotificationData,
) -> Result<Delivery, NotifyError> {
    let (app, recipient, title) = match audience {
        Audience::Customer => (
            PushApp::Customer,
            Recipient::Customer(command.customer_id),
            apps.customer.as_str(),
        ),
        Audience::Driver => {
            let driver_id = command.driver_id.ok_or_else(|| {
                NotifyError::MissingRecipient(format!("{} on order {}", data.kind, data.order_id))
            })?;
            (PushApp::Driver, Recipient::Driver(driver_id), apps.driver.as_str())
        }
    };

    Ok(Delivery::Push {
        app,
        recipient,
        title: localized(title),
        body: localized(body),
        data: data.clone(),
    })
}

fn localized(text: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(LOCALE.to_string(), text.to_string())])
}
