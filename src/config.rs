use std::env;

use crate::error::AppError;

pub const ONESIGNAL_NOTIFICATIONS_URL: &str = "https://onesignal.com/api/v1/notifications";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// `LOG_FORMAT=json` switches the subscriber to one JSON object per line.
    pub log_json: bool,
    pub event_buffer_size: usize,
    pub notify: NotifyConfig,
    pub search: SearchConfig,
    pub push: PushConfig,
}

/// Sizing of the notification worker pool.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub queue_size: usize,
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Dead letters kept in memory; the oldest are evicted past this.
    pub dead_letter_cap: usize,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_radius_m: f64,
    pub max_escalations: u32,
    pub near_drivers_limit: usize,
}

#[derive(Debug, Clone)]
pub struct PushAppConfig {
    pub name: String,
    pub app_id: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub api_url: String,
    pub customer_app: PushAppConfig,
    pub driver_app: PushAppConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Self {
            http_port: parse_or_default("HTTP_PORT", 3001)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            notify: NotifyConfig {
                queue_size: parse_or_default("NOTIFY_QUEUE_SIZE", 1024)?,
                workers: parse_or_default("NOTIFY_WORKERS", 4)?,
                max_attempts: parse_or_default("NOTIFY_MAX_ATTEMPTS", 3)?,
                retry_backoff_ms: parse_or_default("NOTIFY_RETRY_BACKOFF_MS", 200)?,
                dead_letter_cap: parse_or_default("NOTIFY_DEAD_LETTER_CAP", 1000)?,
            },
            search: SearchConfig {
                base_radius_m: parse_or_default("SEARCH_RADIUS_M", 8000.0)?,
                max_escalations: parse_or_default("SEARCH_MAX_ESCALATIONS", 4)?,
                near_drivers_limit: parse_or_default("NEAR_DRIVERS_LIMIT", 20)?,
            },
            push: PushConfig {
                api_url: env::var("PUSH_API_URL")
                    .unwrap_or_else(|_| ONESIGNAL_NOTIFICATIONS_URL.to_string()),
                customer_app: PushAppConfig {
                    name: env::var("CUSTOMER_APP_NAME").unwrap_or_else(|_| "GoGo".to_string()),
                    app_id: env::var("CUSTOMER_APP_ID").unwrap_or_default(),
                    api_key: env::var("CUSTOMER_APP_KEY").unwrap_or_default(),
                },
                driver_app: PushAppConfig {
                    name: env::var("DRIVER_APP_NAME")
                        .unwrap_or_else(|_| "GoGo Driver".to_string()),
                    app_id: env::var("DRIVER_APP_ID").unwrap_or_default(),
                    api_key: env::var("DRIVER_APP_KEY").unwrap_or_default(),
                },
            },
        }
        .validated()
    }

    fn validated(self) -> Result<Self, AppError> {
        if self.notify.workers == 0 {
            return Err(AppError::Internal("NOTIFY_WORKERS must be > 0".to_string()));
        }
        if self.notify.max_attempts == 0 {
            return Err(AppError::Internal(
                "NOTIFY_MAX_ATTEMPTS must be > 0".to_string(),
            ));
        }
        if self.notify.dead_letter_cap == 0 {
            return Err(AppError::Internal(
                "NOTIFY_DEAD_LETTER_CAP must be > 0".to_string(),
            ));
        }
        if self.search.base_radius_m.is_nan() || self.search.base_radius_m <= 0.0 {
            return Err(AppError::Internal("SEARCH_RADIUS_M must be > 0".to_string()));
        }
        Ok(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3001,
            log_level: "info".to_string(),
            log_json: false,
            event_buffer_size: 1024,
            notify: NotifyConfig {
                queue_size: 1024,
                workers: 4,
                max_attempts: 3,
                retry_backoff_ms: 200,
                dead_letter_cap: 1000,
            },
            search: SearchConfig {
                base_radius_m: 8000.0,
                max_escalations: 4,
                near_drivers_limit: 20,
            },
            push: PushConfig {
                api_url: ONESIGNAL_NOTIFICATIONS_URL.to_string(),
                customer_app: PushAppConfig {
                    name: "GoGo".to_string(),
                    app_id: String::new(),
                    api_key: String::new(),
                },
                driver_app: PushAppConfig {
                    name: "GoGo Driver".to_string(),
                    app_id: String::new(),
                    api_key: String::new(),
                },
            },
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
