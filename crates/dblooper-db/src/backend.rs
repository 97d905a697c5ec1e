//! Backend selection from job configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::postgres::PostgresSessionFactory;
use crate::session::SessionFactory;
use crate::sqlite::SqliteSessionFactory;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Postgres,
}

impl Backend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to build a [`SessionFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub backend: Backend,
    /// File path / `":memory:"` for `SQLite`, connection string for `PostgreSQL`.
    pub connection: String,
    /// Per-statement limit. `PostgreSQL` enforces it server-side through
    /// `statement_timeout`; `SQLite` interrupts the statement from a progress
    /// handler and also uses it as the busy timeout for lock waits.
    pub statement_timeout: Option<Duration>,
}

/// Build the factory for the configured backend.
#[must_use]
pub fn factory_for(opts: &ConnectOptions) -> Arc<dyn SessionFactory> {
    match opts.backend {
        Backend::Sqlite => {
            let mut factory = SqliteSessionFactory::open_path(&opts.connection);
            if let Some(timeout) = opts.statement_timeout {
                factory = factory
                    .with_busy_timeout(timeout)
                    .with_statement_timeout(timeout);
            }
            Arc::new(factory)
        }
        Backend::Postgres => {
            let mut factory = PostgresSessionFactory::new(opts.connection.clone());
            if let Some(timeout) = opts.statement_timeout {
                factory = factory.with_statement_timeout(timeout);
            }
            Arc::new(factory)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ParamStyle;

    #[test]
    fn backend_names_are_lowercase() {
        assert_eq!(Backend::Postgres.to_string(), "postgres");
        assert_eq!(Backend::default(), Backend::Sqlite);
    }

    #[test]
    fn factory_matches_backend() {
        let sqlite = factory_for(&ConnectOptions {
            backend: Backend::Sqlite,
            connection: ":memory:".into(),
            statement_timeout: None,
        });
        assert_eq!(sqlite.backend_name(), "sqlite");
        assert_eq!(sqlite.param_style(), ParamStyle::Question);

        let pg = factory_for(&ConnectOptions {
            backend: Backend::Postgres,
            connection: "host=localhost".into(),
            statement_timeout: Some(Duration::from_secs(5)),
        });
        assert_eq!(pg.param_style(), ParamStyle::Dollar);
    }

    #[test]
    fn sqlite_factory_enforces_statement_timeout() {
        let factory = factory_for(&ConnectOptions {
            backend: Backend::Sqlite,
            connection: ":memory:".into(),
            statement_timeout: Some(Duration::from_millis(20)),
        });
        let mut session = factory.open().unwrap();
        let err = session
            .execute(
                "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) \
                 SELECT MAX(x) FROM n",
                &[],
            )
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("timeout"), "{err}");
        session.close().unwrap();
    }
}
