use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

/// Business-facing side of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Requested,
    Accepted,
    Declined,
    Cancelled,
    Prepared,
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Requested,
        OrderStatus::Accepted,
        OrderStatus::Declined,
        OrderStatus::Cancelled,
        OrderStatus::Prepared,
        OrderStatus::Completed,
    ];

    /// Name used for status history keys and notification payload types.
    pub fn event_name(self) -> &'static str {
        match self {
            OrderStatus::Requested => "OrderRequest",
            OrderStatus::Accepted => "OrderAccepted",
            OrderStatus::Declined => "OrderDeclined",
            OrderStatus::Cancelled => "OrderCancelled",
            OrderStatus::Prepared => "OrderPrepared",
            OrderStatus::Completed => "OrderCompleted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Declined | OrderStatus::Cancelled | OrderStatus::Completed
        )
    }
}

/// Driver-facing side of an order: the delivery leg.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum TripStatus {
    #[default]
    None,
    Requested,
    Accepted,
    Declined,
    Cancelled,
    Confirmed,
    Started,
    Arrived,
    Dropped,
    Completed,
}

impl TripStatus {
    pub const ALL: [TripStatus; 10] = [
        TripStatus::None,
        TripStatus::Requested,
        TripStatus::Accepted,
        TripStatus::Declined,
        TripStatus::Cancelled,
        TripStatus::Confirmed,
        TripStatus::Started,
        TripStatus::Arrived,
        TripStatus::Dropped,
        TripStatus::Completed,
    ];

    pub fn event_name(self) -> &'static str {
        match self {
            TripStatus::None => "None",
            TripStatus::Requested => "TripRequest",
            TripStatus::Accepted => "TripAccepted",
            TripStatus::Declined => "TripDeclined",
            TripStatus::Cancelled => "TripCancelled",
            TripStatus::Confirmed => "TripConfirmed",
            TripStatus::Started => "TripStarted",
            TripStatus::Arrived => "TripArrived",
            TripStatus::Dropped => "TripDropped",
            TripStatus::Completed => "TripCompleted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub place_id: String,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub number: String,
    pub customer_id: Uuid,
    pub business_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub items: Vec<LineItem>,
    pub price: f64,
    pub tax: f64,
    pub booking_fee: f64,
    pub total: f64,
    pub delivery_address: DeliveryAddress,
    pub instruction: String,
    pub recipient: String,
    pub order_status: OrderStatus,
    pub trip_status: TripStatus,
    pub status_history: BTreeMap<String, DateTime<Utc>>,
    pub reason_code: Option<u32>,
    pub pickup_score: Option<u8>,
    pub rated: bool,
    pub business_rate: Option<f64>,
    pub business_feedback: Option<String>,
    pub driver_rate: Option<f64>,
    pub driver_feedback: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Recomputes `price` and `total` from the line items and charges.
    pub fn reprice(&mut self) {
        let subtotal: f64 = self
            .items
            .iter()
            .map(|item| item.price * f64::from(item.quantity))
            .sum();
        self.price = round_cents(subtotal);
        self.total = round_cents(self.price + self.tax + self.booking_fee);
    }

    pub fn history_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.status_history.get(key).copied()
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
