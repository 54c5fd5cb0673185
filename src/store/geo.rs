use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_m;
use crate::models::driver::{DriverLocationRecord, DriverLocationUpdate, DriverStatus, GeoPoint};

#[derive(Debug, Clone, Copy)]
pub struct NearQuery {
    pub point: GeoPoint,
    pub max_distance_m: f64,
    pub status: DriverStatus,
    pub limit: usize,
}

/// Last known driver positions with a nearest-neighbour query.
#[async_trait]
pub trait GeoStore: Send + Sync {
    /// Overwrites the driver's record, creating it on first report.
    async fn upsert(&self, update: DriverLocationUpdate) -> Result<DriverLocationRecord, AppError>;

    async fn get(&self, driver_id: Uuid) -> Result<DriverLocationRecord, AppError>;

    async fn set_status(
        &self,
        driver_id: Uuid,
        status: DriverStatus,
    ) -> Result<DriverLocationRecord, AppError>;

    /// Records matching `query.status` within `query.max_distance_m`, nearest
    /// first, with their distance in metres.
    async fn nearest(&self, query: &NearQuery) -> Result<Vec<(DriverLocationRecord, f64)>, AppError>;

    async fn count(&self) -> usize;
}

#[derive(Default)]
pub struct InMemoryGeoStore {
    drivers: DashMap<Uuid, DriverLocationRecord>,
}

impl InMemoryGeoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GeoStore for InMemoryGeoStore {
    async fn upsert(&self, update: DriverLocationUpdate) -> Result<DriverLocationRecord, AppError> {
        let record = DriverLocationRecord {
            driver_id: update.driver_id,
            vehicle_id: update.vehicle_id,
            location: update.location,
            status: update.status,
            updated_at: Utc::now(),
        };

        self.drivers.insert(record.driver_id, record.clone());
        Ok(record)
    }

    async fn get(&self, driver_id: Uuid) -> Result<DriverLocationRecord, AppError> {
        self.drivers
            .get(&driver_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver location {driver_id} not found")))
    }

    async fn set_status(
        &self,
        driver_id: Uuid,
        status: DriverStatus,
    ) -> Result<DriverLocationRecord, AppError> {
        let mut record = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver location {driver_id} not found")))?;

        record.status = status;
        record.updated_at = Utc::now();

        Ok(record.clone())
    }

    async fn nearest(&self, query: &NearQuery) -> Result<Vec<(DriverLocationRecord, f64)>, AppError> {
        let mut hits: Vec<(DriverLocationRecord, f64)> = self
            .drivers
            .iter()
            .filter(|entry| entry.value().status == query.status)
            .filter_map(|entry| {
                let record = entry.value();
                let distance = haversine_m(&query.point, &record.location);
                (distance <= query.max_distance_m).then(|| (record.clone(), distance))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(query.limit);

        Ok(hits)
    }

    async fn count(&self) -> usize {
        self.drivers.len()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{GeoStore, InMemoryGeoStore, NearQuery};
    use crate::models::driver::{DriverLocationUpdate, DriverStatus, GeoPoint};

    fn update(seed: u128, lat: f64, lng: f64, status: DriverStatus) -> DriverLocationUpdate {
        DriverLocationUpdate {
            driver_id: Uuid::from_u128(seed),
            vehicle_id: None,
            location: GeoPoint { lat, lng },
            status,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_previous_record() {
        let store = InMemoryGeoStore::new();
        store
            .upsert(update(1, 40.0, -73.0, DriverStatus::Online))
            .await
            .unwrap();
        store
            .upsert(update(1, 41.0, -74.0, DriverStatus::Offline))
            .await
            .unwrap();

        assert_eq!(store.count().await, 1);
        let record = store.get(Uuid::from_u128(1)).await.unwrap();
        assert_eq!(record.location.lat, 41.0);
        assert_eq!(record.status, DriverStatus::Offline);
    }

    #[tokio::test]
    async fn nearest_filters_by_status_and_radius_and_sorts() {
        let store = InMemoryGeoStore::new();
        store
            .upsert(update(1, 40.730, -73.990, DriverStatus::Online))
            .await
            .unwrap();
        store
            .upsert(update(2, 40.720, -73.993, DriverStatus::Online))
            .await
            .unwrap();
        store
            .upsert(update(3, 40.719, -73.992, DriverStatus::Offline))
            .await
            .unwrap();
        store
            .upsert(update(4, 42.000, -71.000, DriverStatus::Online))
            .await
            .unwrap();

        let hits = store
            .nearest(&NearQuery {
                point: GeoPoint {
                    lat: 40.7193,
                    lng: -73.9928,
                },
                max_distance_m: 8_000.0,
                status: DriverStatus::Online,
                limit: 10,
            })
            .await
            .unwrap();

        let ids: Vec<_> = hits.iter().map(|(record, _)| record.driver_id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(2), Uuid::from_u128(1)]);
        assert!(hits[0].1 <= hits[1].1);
    }

    #[tokio::test]
    async fn set_status_on_unknown_driver_is_not_found() {
        let store = InMemoryGeoStore::new();
        let result = store
            .set_status(Uuid::from_u128(9), DriverStatus::Offline)
            .await;
        assert!(result.is_err());
    }
}
