use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::driver::{
    DriverLocationRecord, DriverLocationUpdate, DriverStatus, GeoPoint, NearbyDriver,
};
use crate::state::AppState;
use crate::store::NearQuery;

/// Outcome of a nearby-driver search. An empty `drivers` list with no
/// `last_error` means nobody is online within the widest radius tried.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSearch {
    pub drivers: Vec<NearbyDriver>,
    pub attempts: u32,
    pub radius_m: f64,
    pub last_error: Option<String>,
}

/// Online drivers nearest to `point`, widening the radius by one base unit
/// after each empty answer until the escalation budget runs out.
pub async fn find_nearby_drivers(state: &AppState, point: GeoPoint, limit: usize) -> DriverSearch {
    let base_radius = state.config.search.base_radius_m;
    let max_attempts = state.config.search.max_escalations + 1;

    let mut radius_m = base_radius;
    let mut attempts = 0;
    let mut last_error = None;
    let mut hits = Vec::new();

    while attempts < max_attempts {
        attempts += 1;

        let query = NearQuery {
            point,
            max_distance_m: radius_m,
            status: DriverStatus::Online,
            limit,
        };

        match state.drivers.nearest(&query).await {
            Ok(found) if !found.is_empty() => {
                hits = found;
                last_error = None;
                break;
            }
            Ok(_) => {
                debug!(radius_m, attempts, "no online drivers in radius");
                last_error = None;
            }
            Err(err) => {
                warn!(radius_m, attempts, error = %err, "nearby driver query failed");
                last_error = Some(err.to_string());
            }
        }

        if attempts < max_attempts {
            radius_m += base_radius;
        }
    }

    state
        .metrics
        .driver_search_attempts
        .observe(f64::from(attempts));

    let mut drivers = Vec::with_capacity(hits.len());
    for (record, distance_m) in hits {
        let driver = state.profiles.get(record.driver_id).await;
        drivers.push(NearbyDriver {
            record,
            driver,
            distance_m,
        });
    }

    info!(
        lat = point.lat,
        lng = point.lng,
        found = drivers.len(),
        attempts,
        radius_m,
        "nearby driver search finished"
    );

    DriverSearch {
        drivers,
        attempts,
        radius_m,
        last_error,
    }
}

pub async fn upsert_location(
    state: &AppState,
    update: DriverLocationUpdate,
) -> Result<DriverLocationRecord, AppError> {
    if !geo::is_valid(&update.location) {
        return Err(AppError::BadRequest(
            "location is out of range".to_string(),
        ));
    }

    let record = state.drivers.upsert(update).await?;
    debug!(driver_id = %record.driver_id, status = ?record.status, "driver location updated");
    Ok(record)
}

pub async fn set_status(
    state: &AppState,
    driver_id: Uuid,
    status: DriverStatus,
) -> Result<DriverLocationRecord, AppError> {
    let record = state.drivers.set_status(driver_id, status).await?;
    info!(driver_id = %driver_id, status = ?status, "driver status changed");
    Ok(record)
}

pub async fn location(state: &AppState, driver_id: Uuid) -> Result<DriverLocationRecord, AppError> {
    state.drivers.get(driver_id).await
}
