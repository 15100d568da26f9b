/// Errors raised by individual notification channels.
///
/// Per-channel failures never unwind the evaluation that produced the alert;
/// the fan-out layer logs them and moves on.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field.
    #[error("invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// An HTTP request to a webhook endpoint failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// SMTP transport or message construction failed.
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// The backend answered but rejected the message.
    #[error("{service} rejected the message: status={status}, detail={detail}")]
    Api {
        service: &'static str,
        status: u16,
        detail: String,
    },

    /// Payload serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Aggregate failure reported by the test-notification hook.
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
