//! Error taxonomy for compiling and looping.
//!
//! `TemplateError` and `ConfigurationError` stop a job before any row runs.
//! `RowError` is per-row and routed according to `fail_fast`. `LoopError`
//! is what [`Looper::run`](crate::Looper::run) hands back to its caller.

use dblooper_db::DbError;

use crate::variables::VariableKind;

/// The statement template cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("statement must contain the upstream query placeholder #table#")]
    MissingUpstreamPlaceholder,

    #[error("upstream query placeholder #table# appears {0} times, expected once")]
    DuplicateUpstreamPlaceholder(usize),

    #[error("statement uses #table# but no upstream query is configured")]
    NoUpstreamQuery,

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("variable '{name}' is {actual}, but the placeholder expects {expected}")]
    VariableTypeMismatch {
        name: String,
        expected: VariableKind,
        actual: VariableKind,
    },
}

/// The job's settings do not fit the declared input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("No column spec available.")]
    EmptyInputSchema,

    #[error("Column {0} doesn't exist in the input table.")]
    UnknownColumn(String),
}

/// Failure of a single input row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("column '{column}' is missing from the row")]
    Bind { column: String },

    #[error("{0}")]
    Execution(String),
}

/// Errors returned by the execution loop itself.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("failed to open database session: {0}")]
    Session(#[source] DbError),

    #[error("database session became unusable at row {row_index}: {source}")]
    Fatal {
        row_index: u64,
        #[source]
        source: DbError,
    },

    #[error("failed to read input row {row_index}: {error:#}")]
    Input { row_index: u64, error: anyhow::Error },

    #[error("output sink failed: {0:#}")]
    Sink(anyhow::Error),
}
