use thiserror::Error;
use uuid::Uuid;

/// Failures on the notification path. These never reach the HTTP caller.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("push gateway unreachable: {0}")]
    Transport(String),

    #[error("push gateway rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("profile {0} not found")]
    ProfileNotFound(Uuid),

    #[error("profile {0} has no push registration")]
    MissingPushToken(Uuid),

    #[error("no recipient for {0}")]
    MissingRecipient(String),
}

impl NotifyError {
    /// Retrying cannot fix these.
    pub fn is_permanent(&self) -> bool {
        match self {
            NotifyError::Transport(_) => false,
            NotifyError::Rejected { status, .. } => *status < 500 && *status != 429,
            NotifyError::ProfileNotFound(_)
            | NotifyError::MissingPushToken(_)
            | NotifyError::MissingRecipient(_) => true,
        }
    }
}
