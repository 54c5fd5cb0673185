pub mod error;
pub mod gateway;
pub mod templates;
pub mod worker;

pub use error::NotifyError;
pub use gateway::{OneSignalGateway, PushGateway, PushMessage, RealtimeHub};
