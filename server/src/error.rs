use shared::ObjectId;

/// Reasons a request is rejected without any state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    #[error("round is not running")]
    RoundNotRunning,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("best score storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("best score storage is malformed: {0}")]
    Format(#[from] serde_json::Error),
}
