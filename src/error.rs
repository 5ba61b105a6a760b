use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlActionError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    PoolError(#[from] r2d2::Error),

    #[error("Connection acquisition error: {0}")]
    AcquisitionError(String),

    #[error("Statement synthesis error: {0}")]
    SynthesisError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Generated key read error: {0}")]
    GeneratedKeyReadError(String),

    #[error("Session close error: {0}")]
    SessionCloseError(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Coarse classification of a [`SqlActionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No connection could be obtained.
    Acquisition,
    /// Caller input could not be turned into a statement.
    StatementSynthesis,
    /// The driver rejected or failed the statement.
    Execution,
    /// Generated keys could not be read. Never surfaced by actions.
    GeneratedKeyRead,
    /// Returning or closing the physical connection failed.
    SessionClose,
    /// Datasource configuration or provider lookup failed.
    Configuration,
}

impl SqlActionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            #[cfg(feature = "sqlite")]
            SqlActionError::SqliteError(_) => ErrorKind::Execution,
            #[cfg(feature = "sqlite")]
            SqlActionError::PoolError(_) => ErrorKind::Acquisition,
            SqlActionError::ExecutionError(_) | SqlActionError::SessionClosed(_) => {
                ErrorKind::Execution
            }
            SqlActionError::AcquisitionError(_) => ErrorKind::Acquisition,
            SqlActionError::SynthesisError(_) => ErrorKind::StatementSynthesis,
            SqlActionError::GeneratedKeyReadError(_) => ErrorKind::GeneratedKeyRead,
            SqlActionError::SessionCloseError(_) => ErrorKind::SessionClose,
            SqlActionError::ConfigError(_) => ErrorKind::Configuration,
        }
    }
}
