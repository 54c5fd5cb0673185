use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::profile::Profile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriverStatus {
    Offline,
    Online,
    OnTrip,
}

/// Last reported position and availability of a driver. One per driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocationRecord {
    pub driver_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub location: GeoPoint,
    pub status: DriverStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocationUpdate {
    pub driver_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub location: GeoPoint,
    pub status: DriverStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyDriver {
    #[serde(flatten)]
    pub record: DriverLocationRecord,
    pub driver: Option<Profile>,
    pub distance_m: f64,
}
