use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};

/// Mutation applied under the order's entry lock. Returning an error leaves
/// the stored order untouched.
pub type OrderMutation = Box<dyn FnOnce(&mut Order) -> Result<(), AppError> + Send>;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Number,
    Total,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub business_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub past: bool,
    pub upcoming: bool,
    pub rated: Option<bool>,
    pub query: Option<String>,
    pub updated_since: Option<DateTime<Utc>>,
    pub sort: SortField,
    pub descending: bool,
    pub offset: usize,
    /// Zero returns everything after `offset`.
    pub count: usize,
}

impl OrderFilter {
    fn matches(&self, order: &Order) -> bool {
        if self.business_id.is_some_and(|id| id != order.business_id) {
            return false;
        }
        if self.customer_id.is_some_and(|id| id != order.customer_id) {
            return false;
        }
        if self.driver_id.is_some() && self.driver_id != order.driver_id {
            return false;
        }
        if self.status.is_some_and(|status| status != order.order_status) {
            return false;
        }
        if self.upcoming && order.order_status.is_terminal() {
            return false;
        }
        if self.past && !order.order_status.is_terminal() {
            return false;
        }
        if self.rated.is_some_and(|rated| rated != order.rated) {
            return false;
        }
        if self
            .updated_since
            .is_some_and(|since| order.updated_at < since)
        {
            return false;
        }
        if let Some(query) = self.query.as_deref().filter(|q| !q.is_empty()) {
            if !order
                .number
                .to_ascii_lowercase()
                .contains(&query.to_ascii_lowercase())
            {
                return false;
            }
        }
        true
    }

    fn compare(&self, a: &Order, b: &Order) -> Ordering {
        let ordering = match self.sort {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::Number => a.number.cmp(&b.number),
            SortField::Total => a.total.total_cmp(&b.total),
        };
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// An order as it was before and after a committed mutation.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub previous: Order,
    pub current: Order,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub total: usize,
    pub items: Vec<Order>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order. Fails with `Conflict` when the id or the order
    /// number is already taken.
    async fn insert(&self, order: Order) -> Result<Order, AppError>;

    async fn get(&self, id: Uuid) -> Result<Order, AppError>;

    /// Atomic read-modify-write returning the previous and the new value.
    async fn update(&self, id: Uuid, mutation: OrderMutation) -> Result<OrderUpdate, AppError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppError>;

    async fn list(&self, filter: &OrderFilter) -> Result<OrderPage, AppError>;

    async fn count(&self) -> usize;
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, Order>,
    numbers: DashMap<String, Uuid>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<Order, AppError> {
        match self.numbers.entry(order.number.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(format!(
                    "order number {} already in use",
                    order.number
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(order.id);
            }
        }

        match self.orders.entry(order.id) {
            Entry::Occupied(_) => {
                self.numbers.remove(&order.number);
                Err(AppError::Conflict(format!("order {} already exists", order.id)))
            }
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(order)
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    async fn update(&self, id: Uuid, mutation: OrderMutation) -> Result<OrderUpdate, AppError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        let previous = entry.value().clone();
        let mut current = previous.clone();
        mutation(&mut current)?;
        *entry = current.clone();

        Ok(OrderUpdate { previous, current })
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let (_, order) = self
            .orders
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        self.numbers.remove(&order.number);
        Ok(())
    }

    async fn list(&self, filter: &OrderFilter) -> Result<OrderPage, AppError> {
        let mut matching: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        matching.sort_by(|a, b| filter.compare(a, b));
        let total = matching.len();

        let take = if filter.count == 0 {
            usize::MAX
        } else {
            filter.count
        };
        let items = matching.into_iter().skip(filter.offset).take(take).collect();

        Ok(OrderPage { total, items })
    }

    async fn count(&self) -> usize {
        self.orders.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{InMemoryOrderStore, OrderFilter, OrderStore, SortField};
    use crate::error::AppError;
    use crate::models::driver::GeoPoint;
    use crate::models::order::{DeliveryAddress, Order, OrderStatus, TripStatus};

    fn order(number: &str, business: u128, status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            number: number.to_string(),
            customer_id: Uuid::from_u128(100),
            business_id: Uuid::from_u128(business),
            driver_id: None,
            items: Vec::new(),
            price: 0.0,
            tax: 0.0,
            booking_fee: 0.0,
            total: 0.0,
            delivery_address: DeliveryAddress {
                place_id: "place".to_string(),
                location: GeoPoint { lat: 0.0, lng: 0.0 },
            },
            instruction: String::new(),
            recipient: String::new(),
            order_status: status,
            trip_status: TripStatus::None,
            status_history: BTreeMap::new(),
            reason_code: None,
            pickup_score: None,
            rated: false,
            business_rate: None,
            business_feedback: None,
            driver_rate: None,
            driver_feedback: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn duplicate_order_number_is_rejected() {
        let store = InMemoryOrderStore::new();
        store
            .insert(order("ABC123", 1, OrderStatus::Requested))
            .await
            .unwrap();

        let result = store
            .insert(order("ABC123", 1, OrderStatus::Requested))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn failed_mutation_leaves_order_untouched() {
        let store = InMemoryOrderStore::new();
        let created = store
            .insert(order("ZZZ999", 1, OrderStatus::Requested))
            .await
            .unwrap();

        let result = store
            .update(
                created.id,
                Box::new(|order: &mut Order| {
                    order.order_status = OrderStatus::Accepted;
                    Err(AppError::Conflict("nope".to_string()))
                }),
            )
            .await;
        assert!(result.is_err());

        let stored = store.get(created.id).await.unwrap();
        assert_eq!(stored.order_status, OrderStatus::Requested);
    }

    #[tokio::test]
    async fn list_filters_past_and_upcoming() {
        let store = InMemoryOrderStore::new();
        store
            .insert(order("AAA111", 1, OrderStatus::Requested))
            .await
            .unwrap();
        store
            .insert(order("BBB222", 1, OrderStatus::Completed))
            .await
            .unwrap();
        store
            .insert(order("CCC333", 2, OrderStatus::Declined))
            .await
            .unwrap();

        let past = store
            .list(&OrderFilter {
                past: true,
                sort: SortField::Number,
                ..OrderFilter::default()
            })
            .await
            .unwrap();
        let numbers: Vec<_> = past.items.iter().map(|o| o.number.as_str()).collect();
        assert_eq!(numbers, vec!["BBB222", "CCC333"]);

        let upcoming = store
            .list(&OrderFilter {
                upcoming: true,
                business_id: Some(Uuid::from_u128(1)),
                ..OrderFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(upcoming.total, 1);
        assert_eq!(upcoming.items[0].number, "AAA111");
    }

    #[tokio::test]
    async fn list_paginates_after_counting() {
        let store = InMemoryOrderStore::new();
        for (i, number) in ["N00001", "N00002", "N00003"].iter().enumerate() {
            let mut o = order(number, 1, OrderStatus::Requested);
            o.created_at = Utc::now() + Duration::seconds(i as i64);
            store.insert(o).await.unwrap();
        }

        let page = store
            .list(&OrderFilter {
                descending: true,
                offset: 1,
                count: 1,
                ..OrderFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].number, "N00002");
    }

    #[tokio::test]
    async fn query_matches_number_case_insensitively() {
        let store = InMemoryOrderStore::new();
        store
            .insert(order("XYZ789", 1, OrderStatus::Requested))
            .await
            .unwrap();

        let page = store
            .list(&OrderFilter {
                query: Some("yz7".to_string()),
                ..OrderFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }
}
