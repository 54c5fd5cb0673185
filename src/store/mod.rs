//! Persistence seams. Each store is an async trait so the dispatcher and the
//! locator never see the backing engine; the in-memory implementations keep
//! one `DashMap` per collection and give per-entry atomic updates.

pub mod geo;
pub mod orders;
pub mod profiles;

pub use geo::{GeoStore, InMemoryGeoStore, NearQuery};
pub use orders::{
    InMemoryOrderStore, OrderFilter, OrderMutation, OrderPage, OrderStore, OrderUpdate, SortField,
};
pub use profiles::{InMemoryProfileStore, ProfileStore};
