use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::notification::{DeadLetter, NotifyCommand, NotifyEvent};
use crate::state::AppState;

/// Hands a command to the notification workers without waiting. A full or
/// closed queue dead-letters the command instead of failing the caller.
pub fn enqueue_notification(state: &AppState, command: NotifyCommand) {
    // Incremented before the send: a worker may dequeue and decrement first.
    state.metrics.notification_queue_depth.inc();

    match state.notify_tx.try_send(command) {
        Ok(()) => debug!("notify command queued"),
        Err(err) => {
            state.metrics.notification_queue_depth.dec();
            let (reason, command) = match err {
                TrySendError::Full(command) => ("notification queue full", command),
                TrySendError::Closed(command) => ("notification queue closed", command),
            };

            error!(order_id = %command.order_id, reason, "dropping notify command");

            let letter = DeadLetter {
                id: Uuid::new_v4(),
                order_id: command.order_id,
                channel: "queue".to_string(),
                kind: event_kind(command.event).to_string(),
                attempts: 0,
                error: reason.to_string(),
                failed_at: Utc::now(),
            };
            state.record_dead_letter(letter);
        }
    }
}

pub fn event_kind(event: NotifyEvent) -> &'static str {
    match event {
        NotifyEvent::Order(status) => status.event_name(),
        NotifyEvent::Trip(status) => status.event_name(),
    }
}
