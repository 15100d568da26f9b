/// Errors raised by the state store.
///
/// Everything here is transient from the engine's point of view: an
/// evaluation that hits one logs it and degrades (a failed dedup check skips
/// the send to preserve at-most-once; a failed history write is recorded and
/// not compensated).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying driver or connection-pool error.
    #[error("state store error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization of an alert data snapshot failed.
    #[error("state store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
