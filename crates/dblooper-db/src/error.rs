//! Database error types.

/// Errors produced by [`DbSession`](crate::DbSession) and
/// [`SessionFactory`](crate::SessionFactory) operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A single statement failed; the session is still usable.
    #[error("{0}")]
    Statement(String),

    /// The session can no longer be used (closed, corrupt, unreachable).
    #[error("connection unusable: {0}")]
    Connection(String),

    /// A value or column type the session cannot map.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Whether the session that produced this error must be abandoned.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_))
    }

    /// Classify a `SQLite` error as statement-level or fatal.
    #[must_use]
    pub fn sqlite(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        let fatal = matches!(
            err.sqlite_error_code(),
            Some(
                ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::OutOfMemory
                    | ErrorCode::DiskFull
                    | ErrorCode::InternalMalfunction
            )
        );
        if fatal {
            Self::Connection(err.to_string())
        } else {
            Self::Statement(err.to_string())
        }
    }

    /// Classify a `PostgreSQL` error as statement-level or fatal.
    #[must_use]
    pub fn postgres(err: &::postgres::Error) -> Self {
        if err.is_closed() {
            return Self::Connection(err.to_string());
        }
        // Prefer the server's message over the generic "db error" wrapper.
        match err.as_db_error() {
            Some(db) => Self::Statement(db.message().to_string()),
            None => Self::Statement(err.to_string()),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, DbError>;
