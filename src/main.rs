use std::sync::Arc;

use delivery_dispatch::api;
use delivery_dispatch::config::Config;
use delivery_dispatch::error::AppError;
use delivery_dispatch::notifications::worker::run_notification_workers;
use delivery_dispatch::notifications::OneSignalGateway;
use delivery_dispatch::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    let push = OneSignalGateway::new(config.push.clone())
        .map_err(|err| AppError::Internal(format!("push gateway: {err}")))?;
    let http_port = config.http_port;

    let (app_state, notify_rx) = AppState::new(config, Arc::new(push));
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_notification_workers(shared_state.clone(), notify_rx));

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
