#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind query parameters: `{0}`")]
    InvalidQueryParams(anyhow::Error),
    #[error("transaction timed out")]
    TxTimeout,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Vfs(#[from] memvfs::Status),
    #[error(transparent)]
    Registration(#[from] anyhow::Error),
    // Dedicated for the most generic internal errors. Consider a dedicated variant instead if
    // you find yourself matching on the message.
    #[error("internal error: `{0}`")]
    Internal(String),
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(inner: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::Internal(format!("failed to receive response from connection actor: {inner}"))
    }
}
