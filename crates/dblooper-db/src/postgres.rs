//! `PostgreSQL`-backed sessions.
//!
//! Uses the sync `postgres` crate. The crate manages its own internal tokio
//! runtime, so sessions work from any thread.

use std::collections::HashMap;
use std::time::Duration;

use dblooper_types::{ResultSet, Value};
use postgres::types::ToSql;
use postgres::{Client, NoTls, Statement};

use crate::error::{self, DbError};
use crate::pg_types::{read_value, PgParam};
use crate::session::{DbSession, ParamStyle, SessionFactory};

/// Opens `PostgreSQL` sessions from a libpq-style connection string.
///
/// `connstr` is a libpq-style connection string or `PostgreSQL` URI:
/// - `"host=localhost port=5432 dbname=shop user=postgres"`
/// - `"postgresql://postgres@localhost/shop"`
#[derive(Debug, Clone)]
pub struct PostgresSessionFactory {
    connstr: String,
    statement_timeout: Option<Duration>,
}

impl PostgresSessionFactory {
    #[must_use]
    pub fn new(connstr: impl Into<String>) -> Self {
        Self {
            connstr: connstr.into(),
            statement_timeout: None,
        }
    }

    /// Server-side limit applied to every statement of the session.
    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }
}

impl SessionFactory for PostgresSessionFactory {
    fn open(&self) -> error::Result<Box<dyn DbSession>> {
        let mut client = Client::connect(&self.connstr, NoTls)
            .map_err(|e| DbError::Connection(e.to_string()))?;
        if let Some(timeout) = self.statement_timeout {
            client
                .batch_execute(&format!("SET statement_timeout = {}", timeout.as_millis()))
                .map_err(|e| DbError::postgres(&e))?;
        }
        tracing::debug!("Opened PostgreSQL session");
        Ok(Box::new(PostgresSession {
            client,
            statements: HashMap::new(),
        }))
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Dollar
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// One `PostgreSQL` client plus its prepared-statement cache.
pub struct PostgresSession {
    client: Client,
    statements: HashMap<String, Statement>,
}

impl PostgresSession {
    fn classify(&self, err: &postgres::Error) -> DbError {
        if self.client.is_closed() {
            DbError::Connection(err.to_string())
        } else {
            DbError::postgres(err)
        }
    }

    fn prepare(&mut self, sql: &str) -> error::Result<Statement> {
        if let Some(stmt) = self.statements.get(sql) {
            return Ok(stmt.clone());
        }
        let stmt = match self.client.prepare(sql) {
            Ok(stmt) => stmt,
            Err(e) => return Err(self.classify(&e)),
        };
        self.statements.insert(sql.to_string(), stmt.clone());
        Ok(stmt)
    }
}

impl DbSession for PostgresSession {
    fn execute(&mut self, sql: &str, params: &[Value]) -> error::Result<ResultSet> {
        let stmt = self.prepare(sql)?;
        let wrapped: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            wrapped.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        if stmt.columns().is_empty() {
            if let Err(e) = self.client.execute(&stmt, &refs) {
                return Err(self.classify(&e));
            }
            return Ok(ResultSet::empty());
        }

        let columns: Vec<String> = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let rows = match self.client.query(&stmt, &refs) {
            Ok(rows) => rows,
            Err(e) => return Err(self.classify(&e)),
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = (0..columns.len())
                .map(|i| read_value(row, i))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(values);
        }
        Ok(ResultSet::new(columns, out))
    }

    fn close(self: Box<Self>) -> error::Result<()> {
        self.client
            .close()
            .map_err(|e| DbError::Connection(e.to_string()))
    }
}
