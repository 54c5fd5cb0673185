use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::queue::event_kind;
use crate::models::notification::{DeadLetter, Delivery, NotifyCommand, RealtimeEvent};
use crate::notifications::error::NotifyError;
use crate::notifications::gateway::PushMessage;
use crate::notifications::templates::compose;
use crate::state::AppState;

/// Runs the worker pool until the command channel closes.
pub async fn run_notification_workers(
    state: Arc<AppState>,
    notify_rx: mpsc::Receiver<NotifyCommand>,
) {
    let workers = state.config.notify.workers.max(1);
    let notify_rx = Arc::new(Mutex::new(notify_rx));

    let handles: Vec<_> = (0..workers)
        .map(|worker_id| tokio::spawn(worker_loop(worker_id, state.clone(), notify_rx.clone())))
        .collect();

    info!(workers, "notification workers started");

    for handle in handles {
        if let Err(err) = handle.await {
            error!(error = %err, "notification worker panicked");
        }
    }

    warn!("notification workers stopped: queue channel closed");
}

async fn worker_loop(
    worker_id: usize,
    state: Arc<AppState>,
    notify_rx: Arc<Mutex<mpsc::Receiver<NotifyCommand>>>,
) {
    loop {
        let next = {
            let mut rx = notify_rx.lock().await;
            rx.recv().await
        };
        let Some(command) = next else {
            break;
        };

        state.metrics.notification_queue_depth.dec();
        debug!(worker_id, order_id = %command.order_id, "processing notify command");
        handle_command(&state, command).await;
    }
}

/// Composes and delivers every notification a command implies. Failures end
/// up in the dead-letter list; nothing is returned to the caller.
pub async fn handle_command(state: &AppState, command: NotifyCommand) {
    let deliveries = match compose(&command, &state.app_names()) {
        Ok(deliveries) => deliveries,
        Err(err) => {
            dead_letter(
                state,
                command.order_id,
                "push",
                event_kind(command.event),
                0,
                &err,
            );
            return;
        }
    };

    for delivery in &deliveries {
        deliver_with_retry(state, delivery).await;
    }
}

async fn deliver_with_retry(state: &AppState, delivery: &Delivery) {
    let max_attempts = state.config.notify.max_attempts.max(1);
    let backoff_ms = state.config.notify.retry_backoff_ms;
    let channel = delivery.channel_label();
    let data = delivery.data();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match deliver(state, delivery).await {
            Ok(()) => {
                state
                    .metrics
                    .notifications_total
                    .with_label_values(&[channel, "delivered"])
                    .inc();
                return;
            }
            Err(err) if err.is_permanent() || attempt >= max_attempts => {
                state
                    .metrics
                    .notifications_total
                    .with_label_values(&[channel, "failed"])
                    .inc();
                dead_letter(state, data.order_id, channel, &data.kind, attempt, &err);
                return;
            }
            Err(err) => {
                warn!(
                    order_id = %data.order_id,
                    channel,
                    attempt,
                    error = %err,
                    "notification delivery failed; retrying"
                );
                sleep(Duration::from_millis(backoff_ms * u64::from(attempt))).await;
            }
        }
    }
}

async fn deliver(state: &AppState, delivery: &Delivery) -> Result<(), NotifyError> {
    match delivery {
        Delivery::Realtime { channel, data } => {
            let receivers = state.realtime.publish(RealtimeEvent {
                channel: channel.clone(),
                data: data.clone(),
            });
            debug!(channel = %channel, kind = %data.kind, receivers, "realtime event published");
            Ok(())
        }
        Delivery::Push {
            app,
            recipient,
            title,
            body,
            data,
        } => {
            let actor_id = recipient.actor_id();
            let profile = state
                .profiles
                .get(actor_id)
                .await
                .ok_or(NotifyError::ProfileNotFound(actor_id))?;
            let player_id = profile
                .push_player_id
                .filter(|id| !id.is_empty())
                .ok_or(NotifyError::MissingPushToken(actor_id))?;

            state
                .push
                .push(&PushMessage {
                    app: *app,
                    player_ids: vec![player_id],
                    title: title.clone(),
                    body: body.clone(),
                    data: data.clone(),
                })
                .await
        }
    }
}

fn dead_letter(
    state: &AppState,
    order_id: Uuid,
    channel: &str,
    kind: &str,
    attempts: u32,
    err: &NotifyError,
) {
    error!(
        order_id = %order_id,
        channel,
        kind,
        attempts,
        error = %err,
        "notification dead-lettered"
    );

    let letter = DeadLetter {
        id: Uuid::new_v4(),
        order_id,
        channel: channel.to_string(),
        kind: kind.to_string(),
        attempts,
        error: err.to_string(),
        failed_at: Utc::now(),
    };
    state.record_dead_letter(letter);
}
