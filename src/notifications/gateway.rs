use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::{PushAppConfig, PushConfig};
use crate::models::notification::{NotificationData, PushApp, RealtimeEvent};
use crate::notifications::error::NotifyError;

#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub app: PushApp,
    pub player_ids: Vec<String>,
    pub title: BTreeMap<String, String>,
    pub body: BTreeMap<String, String>,
    pub data: NotificationData,
}

/// Mobile push transport. One call per message, no retry at this layer.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn push(&self, message: &PushMessage) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct OneSignalNotification<'a> {
    app_id: &'a str,
    include_player_ids: &'a [String],
    headings: &'a BTreeMap<String, String>,
    contents: &'a BTreeMap<String, String>,
    data: &'a NotificationData,
}

#[derive(Clone)]
pub struct OneSignalGateway {
    client: Client,
    config: PushConfig,
}

impl OneSignalGateway {
    pub fn new(config: PushConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        Ok(Self { client, config })
    }

    fn app(&self, app: PushApp) -> &PushAppConfig {
        match app {
            PushApp::Customer => &self.config.customer_app,
            PushApp::Driver => &self.config.driver_app,
        }
    }
}

#[async_trait]
impl PushGateway for OneSignalGateway {
    async fn push(&self, message: &PushMessage) -> Result<(), NotifyError> {
        let app = self.app(message.app);
        let payload = OneSignalNotification {
            app_id: &app.app_id,
            include_player_ids: &message.player_ids,
            headings: &message.title,
            contents: &message.body,
            data: &message.data,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("Basic {}", app.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;

        if status.is_success() {
            info!(
                order_id = %message.data.order_id,
                kind = %message.data.kind,
                response = %body,
                "push notification sent"
            );
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Live channels for business dashboards, one logical channel per business id.
#[derive(Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeHub {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Returns how many live sessions received the event.
    pub fn publish(&self, event: RealtimeEvent) -> usize {
        let channel = event.channel.clone();
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(channel = %channel, "no live session for realtime event");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }
}
