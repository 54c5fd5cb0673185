use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Live order feed for one business. Each frame is the JSON notification
/// payload, e.g. `{"type":"OrderRequest","orderId":"..."}`.
pub async fn business_feed(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<Uuid>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, business_id.to_string()))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, channel: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.realtime.subscribe());

    info!(channel = %channel, "realtime session opened");

    let send_channel = channel.clone();
    let send_task = tokio::spawn(async move {
        while let Some(next) = events.next().await {
            let event = match next {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(channel = %send_channel, skipped, "realtime session lagged");
                    continue;
                }
            };
            if event.channel != send_channel {
                continue;
            }

            let json = match serde_json::to_string(&event.data) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize realtime event");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(channel = %channel, "realtime session closed");
}
