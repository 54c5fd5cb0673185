use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::profile::Profile;

/// Lookup of customer, business and driver profiles by id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Option<Profile>;

    async fn upsert(&self, profile: Profile) -> Profile;
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<Uuid, Profile>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, id: Uuid) -> Option<Profile> {
        self.profiles.get(&id).map(|entry| entry.value().clone())
    }

    async fn upsert(&self, profile: Profile) -> Profile {
        self.profiles.insert(profile.id, profile.clone());
        profile
    }
}
