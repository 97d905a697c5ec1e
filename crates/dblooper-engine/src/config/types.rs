//! Job YAML schema.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use dblooper_db::{Backend, ConnectOptions};
use dblooper_types::{ColumnSpec, LoopOptions};
use serde::{Deserialize, Serialize};

use crate::template::DEFAULT_STATEMENT;
use crate::variables::VariableValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub version: String,
    pub job: String,
    pub database: DatabaseConfig,
    #[serde(default = "default_statement")]
    pub statement: String,
    /// Values for `$${...}$$` placeholders. YAML scalar type decides the
    /// variable type.
    #[serde(default)]
    pub variables: BTreeMap<String, VariableValue>,
    #[serde(default)]
    pub options: JobOptions,
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

fn default_statement() -> String {
    DEFAULT_STATEMENT.to_string()
}

fn default_progress_every() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: Backend,
    pub connection: String,
    /// Query substituted for `#table#`.
    pub upstream_query: Option<String>,
    /// Wall-clock limit per statement. Server-side `statement_timeout` on
    /// `PostgreSQL`; on `SQLite` the statement is interrupted, and lock waits
    /// give up after the same duration.
    pub statement_timeout_ms: Option<u64>,
}

impl DatabaseConfig {
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            backend: self.backend,
            connection: self.connection.clone(),
            statement_timeout: self.statement_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(flatten)]
    pub loop_options: LoopOptions,
    /// Reject statements without `#table#`.
    #[serde(default)]
    pub require_upstream_placeholder: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// JSON Lines file, one object per input row.
    pub path: PathBuf,
    /// Declared input schema. Inferred from the first line when absent.
    #[serde(default)]
    pub columns: Option<Vec<ColumnSpec>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub rows: PathBuf,
    pub errors: PathBuf,
}
