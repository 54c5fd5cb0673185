use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::models::notification::{DeadLetter, NotifyCommand};
use crate::notifications::templates::AppNames;
use crate::notifications::{PushGateway, RealtimeHub};
use crate::observability::metrics::Metrics;
use crate::store::{
    GeoStore, InMemoryGeoStore, InMemoryOrderStore, InMemoryProfileStore, OrderStore,
    ProfileStore,
};

pub struct AppState {
    pub config: Config,
    pub orders: Arc<dyn OrderStore>,
    pub drivers: Arc<dyn GeoStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub push: Arc<dyn PushGateway>,
    pub realtime: RealtimeHub,
    pub notify_tx: mpsc::Sender<NotifyCommand>,
    pub dead_letters: DashMap<Uuid, DeadLetter>,
    pub metrics: Metrics,
}

impl AppState {
    /// State backed by the in-memory stores.
    pub fn new(
        config: Config,
        push: Arc<dyn PushGateway>,
    ) -> (Self, mpsc::Receiver<NotifyCommand>) {
        Self::with_stores(
            config,
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(InMemoryGeoStore::new()),
            Arc::new(InMemoryProfileStore::new()),
            push,
        )
    }

    pub fn with_stores(
        config: Config,
        orders: Arc<dyn OrderStore>,
        drivers: Arc<dyn GeoStore>,
        profiles: Arc<dyn ProfileStore>,
        push: Arc<dyn PushGateway>,
    ) -> (Self, mpsc::Receiver<NotifyCommand>) {
        let (notify_tx, notify_rx) = mpsc::channel(config.notify.queue_size.max(1));
        let realtime = RealtimeHub::new(config.event_buffer_size.max(1));

        (
            Self {
                config,
                orders,
                drivers,
                profiles,
                push,
                realtime,
                notify_tx,
                dead_letters: DashMap::new(),
                metrics: Metrics::new(),
            },
            notify_rx,
        )
    }

    /// Stores a failed notification, evicting the oldest letters once the
    /// configured cap is exceeded.
    pub fn record_dead_letter(&self, letter: DeadLetter) {
        self.dead_letters.insert(letter.id, letter);
        self.metrics.dead_letters_total.inc();

        let cap = self.config.notify.dead_letter_cap.max(1);
        while self.dead_letters.len() > cap {
            let oldest = self
                .dead_letters
                .iter()
                .min_by_key(|entry| entry.value().failed_at)
                .map(|entry| *entry.key());
            let Some(id) = oldest else {
                break;
            };
            self.dead_letters.remove(&id);
            debug!(dead_letter_id = %id, "evicted oldest dead letter");
        }
    }

    pub fn app_names(&self) -> AppNames {
        AppNames {
            customer: self.config.push.customer_app.name.clone(),
            driver: self.config.push.driver_app.name.clone(),
        }
    }
}
