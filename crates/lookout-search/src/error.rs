/// Errors surfaced by the search store client.
///
/// `Transport` and `BadResponse` are recoverable per rule evaluation: the
/// engine logs them, skips the tick, and releases the lease. `Unavailable`
/// is fatal during startup (health probe) and recoverable afterwards.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The HTTP call itself failed (connect, TLS, timeout, body read).
    #[error("search store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a non-2xx status.
    #[error("search store returned status {status}: {body}")]
    BadResponse { status: u16, body: String },

    /// The cluster reported itself unusable (red) or could not be probed.
    #[error("search store unavailable: {0}")]
    Unavailable(String),

    /// The response body did not match the expected envelope.
    #[error("failed to decode search store response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;
