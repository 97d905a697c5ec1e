//! `SQLite`-backed sessions.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dblooper_types::{ResultSet, Value};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql};

use crate::error::{self, DbError};
use crate::session::{DbSession, ParamStyle, SessionFactory};

/// In-memory database name accepted by [`SqliteSessionFactory::open_path`].
pub const MEMORY: &str = ":memory:";

/// VM instructions between deadline checks.
const PROGRESS_OPS: i32 = 1000;

/// Opens `SQLite` sessions on a file or an in-memory database.
///
/// Every session from an in-memory factory starts from an empty database,
/// so `init_sql` is the way to seed one (tests, scratch jobs).
#[derive(Debug, Clone)]
pub struct SqliteSessionFactory {
    path: Option<PathBuf>,
    init_sql: Option<String>,
    busy_timeout: Option<Duration>,
    statement_timeout: Option<Duration>,
}

impl SqliteSessionFactory {
    /// Factory for the database file at `path` (`":memory:"` for in-memory).
    #[must_use]
    pub fn open_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            path: (path != Path::new(MEMORY)).then(|| path.to_path_buf()),
            init_sql: None,
            busy_timeout: None,
            statement_timeout: None,
        }
    }

    /// Factory for fresh in-memory databases.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::open_path(MEMORY)
    }

    /// Batch of SQL run on every newly opened session.
    #[must_use]
    pub fn with_init_sql(mut self, sql: impl Into<String>) -> Self {
        self.init_sql = Some(sql.into());
        self
    }

    /// How long a statement waits on a locked database before failing.
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Interrupt any statement still running after `timeout`.
    ///
    /// Time spent waiting on a lock is bounded by the busy timeout instead.
    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }
}

impl SessionFactory for SqliteSessionFactory {
    fn open(&self) -> error::Result<Box<dyn DbSession>> {
        let conn = match &self.path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)
            }
            None => Connection::open_in_memory(),
        }
        .map_err(|e| DbError::Connection(e.to_string()))?;

        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout).map_err(DbError::sqlite)?;
        }
        if let Some(sql) = &self.init_sql {
            conn.execute_batch(sql).map_err(DbError::sqlite)?;
        }
        let deadline = self.statement_timeout.map(Deadline::new);
        if let Some(deadline) = &deadline {
            let watched = deadline.clone();
            conn.progress_handler(PROGRESS_OPS, Some(move || watched.expired()));
        }

        let label = self
            .path
            .as_ref()
            .map_or_else(|| MEMORY.to_string(), |p| p.display().to_string());
        tracing::debug!(path = %label, "Opened SQLite session");
        Ok(Box::new(SqliteSession { conn, deadline }))
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Question
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Wall-clock limit for the statement currently running on a session.
///
/// Shared with the connection's progress handler, which interrupts the
/// statement once the armed instant has passed.
#[derive(Debug, Clone)]
struct Deadline {
    limit: Duration,
    at: Arc<Mutex<Option<Instant>>>,
}

impl Deadline {
    fn new(limit: Duration) -> Self {
        Self {
            limit,
            at: Arc::new(Mutex::new(None)),
        }
    }

    fn set(&self, at: Option<Instant>) {
        if let Ok(mut slot) = self.at.lock() {
            *slot = at;
        }
    }

    fn expired(&self) -> bool {
        self.at
            .lock()
            .is_ok_and(|slot| slot.is_some_and(|at| Instant::now() >= at))
    }
}

/// One `SQLite` connection.
pub struct SqliteSession {
    conn: Connection,
    deadline: Option<Deadline>,
}

impl SqliteSession {
    fn run(&mut self, sql: &str, params: &[Value]) -> error::Result<ResultSet> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(DbError::sqlite)?;
        let bound = rusqlite::params_from_iter(params.iter().map(SqliteParam));

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(ToString::to_string)
            .collect();
        if columns.is_empty() {
            stmt.execute(bound).map_err(DbError::sqlite)?;
            return Ok(ResultSet::empty());
        }

        let width = columns.len();
        let mut rows = stmt.query(bound).map_err(DbError::sqlite)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(DbError::sqlite)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i).map_err(DbError::sqlite)?));
            }
            out.push(values);
        }
        Ok(ResultSet::new(columns, out))
    }
}

/// Borrowed [`Value`] adapter for `rusqlite` parameter binding.
struct SqliteParam<'a>(&'a Value);

impl ToSql for SqliteParam<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Boolean(v) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*v))),
            Value::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Value::Float(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Blob(v.to_vec()),
    }
}

impl DbSession for SqliteSession {
    fn execute(&mut self, sql: &str, params: &[Value]) -> error::Result<ResultSet> {
        let Some(deadline) = self.deadline.clone() else {
            return self.run(sql, params);
        };
        deadline.set(Some(Instant::now() + deadline.limit));
        let result = self.run(sql, params);
        let timed_out = matches!(result, Err(DbError::Statement(_))) && deadline.expired();
        deadline.set(None);
        if timed_out {
            return Err(DbError::Statement(format!(
                "statement exceeded timeout of {} ms",
                deadline.limit.as_millis()
            )));
        }
        result
    }

    fn close(self: Box<Self>) -> error::Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| DbError::Connection(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r"
CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL);
INSERT INTO customers VALUES (1, 'ada', 9.5), (2, 'grace', NULL), (3, 'linus', 7.0);
";

    fn session() -> Box<dyn DbSession> {
        SqliteSessionFactory::in_memory()
            .with_init_sql(SEED)
            .open()
            .unwrap()
    }

    #[test]
    fn select_with_positional_params() {
        let mut s = session();
        let rs = s
            .execute(
                "SELECT id, name, score FROM customers WHERE id = ? OR id = ? ORDER BY id",
                &[Value::Integer(1), Value::Integer(2)],
            )
            .unwrap();
        assert_eq!(rs.columns, vec!["id", "name", "score"]);
        assert_eq!(rs.rows.len(), 2);
        assert_eq!(rs.rows[0][1], Value::Text("ada".into()));
        assert_eq!(rs.rows[1][2], Value::Null);
        s.close().unwrap();
    }

    #[test]
    fn zero_row_query_still_declares_columns() {
        let mut s = session();
        let rs = s
            .execute("SELECT id, name FROM customers WHERE id = ?", &[Value::Integer(99)])
            .unwrap();
        assert_eq!(rs.columns, vec!["id", "name"]);
        assert!(rs.is_empty());
    }

    #[test]
    fn dml_returns_no_columns() {
        let mut s = session();
        let rs = s
            .execute(
                "UPDATE customers SET name = ? WHERE id = ?",
                &[Value::Text("ada l.".into()), Value::Integer(1)],
            )
            .unwrap();
        assert!(rs.columns.is_empty());

        let rs = s
            .execute("SELECT name FROM customers WHERE id = 1", &[])
            .unwrap();
        assert_eq!(rs.rows[0][0], Value::Text("ada l.".into()));
    }

    #[test]
    fn statement_failure_keeps_session_usable() {
        let mut s = session();
        let err = s.execute("SELECT * FROM nope", &[]).unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("no such table"));

        let rs = s.execute("SELECT COUNT(*) FROM customers", &[]).unwrap();
        assert_eq!(rs.rows[0][0], Value::Integer(3));
    }

    #[test]
    fn constraint_violation_is_statement_error() {
        let mut s = session();
        let err = s
            .execute(
                "INSERT INTO customers (id, name) VALUES (?, ?)",
                &[Value::Integer(1), Value::Text("dup".into())],
            )
            .unwrap_err();
        assert!(matches!(err, DbError::Statement(_)));
    }

    #[test]
    fn booleans_bind_as_integers() {
        let mut s = session();
        let rs = s.execute("SELECT ? + 0", &[Value::Boolean(true)]).unwrap();
        assert_eq!(rs.rows[0][0], Value::Integer(1));
    }

    #[test]
    fn statement_timeout_interrupts_long_query() {
        let mut s = SqliteSessionFactory::in_memory()
            .with_init_sql(SEED)
            .with_statement_timeout(Duration::from_millis(50))
            .open()
            .unwrap();
        let err = s
            .execute(
                "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) \
                 SELECT COUNT(*) FROM n",
                &[],
            )
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("timeout of 50 ms"), "{err}");

        // The next statement gets a fresh budget.
        let rs = s.execute("SELECT COUNT(*) FROM customers", &[]).unwrap();
        assert_eq!(rs.rows[0][0], Value::Integer(3));
    }

    #[test]
    fn file_backed_factory_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("loop.db");
        let factory = SqliteSessionFactory::open_path(&path).with_init_sql(SEED);
        factory.open().unwrap().close().unwrap();
        assert!(path.exists());
    }
}
