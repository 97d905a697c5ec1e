//! Session contract consumed by the execution loop.

use dblooper_types::{ResultSet, Value};

use crate::error;

/// Positional parameter marker syntax understood by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamStyle {
    /// `?` for every parameter (`SQLite`, JDBC-style).
    #[default]
    Question,
    /// `$1`, `$2`, ... numbered in order of appearance (`PostgreSQL`).
    Dollar,
}

impl ParamStyle {
    /// Marker text for the parameter at zero-based `position`.
    #[must_use]
    pub fn marker(self, position: usize) -> String {
        match self {
            Self::Question => "?".to_string(),
            Self::Dollar => format!("${}", position + 1),
        }
    }
}

/// One open database session.
///
/// A session is owned by a single loop at a time and is never shared, so
/// implementations only need to be `Send`.
pub trait DbSession: Send {
    /// Execute `sql` with positional `params` and collect every result row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Statement`](crate::DbError::Statement) when only
    /// this statement failed and [`DbError::Connection`](crate::DbError::Connection)
    /// when the session itself is no longer usable.
    fn execute(&mut self, sql: &str, params: &[Value]) -> error::Result<ResultSet>;

    /// Release the session. Called exactly once per opened session.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`](crate::DbError) if the driver reports a failure
    /// while closing.
    fn close(self: Box<Self>) -> error::Result<()>;
}

/// Opens sessions against one configured database.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn SessionFactory>`.
pub trait SessionFactory: Send + Sync {
    /// Open a new session.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`](crate::DbError) if the database can't be reached.
    fn open(&self) -> error::Result<Box<dyn DbSession>>;

    /// Marker syntax sessions from this factory expect.
    fn param_style(&self) -> ParamStyle;

    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traits_are_object_safe() {
        fn _assert_session(_: &dyn DbSession) {}
        fn _assert_factory(_: &dyn SessionFactory) {}
    }

    #[test]
    fn dollar_markers_are_one_based() {
        assert_eq!(ParamStyle::Dollar.marker(0), "$1");
        assert_eq!(ParamStyle::Dollar.marker(2), "$3");
        assert_eq!(ParamStyle::Question.marker(5), "?");
    }
}
