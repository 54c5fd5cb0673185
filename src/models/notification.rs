use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{OrderStatus, TripStatus};

/// Client-side routing block attached to every notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(rename = "type")]
    pub kind: String,
    pub order_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PushApp {
    Customer,
    Driver,
}

/// Who a push goes to. Resolved to device tokens by the worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Recipient {
    Customer(Uuid),
    Driver(Uuid),
}

impl Recipient {
    pub fn actor_id(self) -> Uuid {
        match self {
            Recipient::Customer(id) | Recipient::Driver(id) => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Delivery {
    Push {
        app: PushApp,
        recipient: Recipient,
        title: BTreeMap<String, String>,
        body: BTreeMap<String, String>,
        data: NotificationData,
    },
    Realtime {
        channel: String,
        data: NotificationData,
    },
}

impl Delivery {
    pub fn channel_label(&self) -> &'static str {
        match self {
            Delivery::Push { .. } => "push",
            Delivery::Realtime { .. } => "realtime",
        }
    }

    pub fn data(&self) -> &NotificationData {
        match self {
            Delivery::Push { data, .. } | Delivery::Realtime { data, .. } => data,
        }
    }
}

/// Work item sent from the dispatcher to the notification workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyCommand {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub business_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub event: NotifyEvent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotifyEvent {
    Order(OrderStatus),
    Trip(TripStatus),
}

/// Message published on a business's live channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RealtimeEvent {
    pub channel: String,
    pub data: NotificationData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: Uuid,
    pub order_id: Uuid,
    pub channel: String,
    pub kind: String,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}
