//! Reports returned by the orchestrator entry points.

use std::path::PathBuf;

use dblooper_db::Backend;

use crate::looper::LoopSummary;
use crate::template::CompiledStatement;

/// Outcome of [`crate::run_job`].
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: String,
    pub summary: LoopSummary,
    pub rows_path: PathBuf,
    pub errors_path: PathBuf,
}

impl JobReport {
    /// Whether every input row was processed.
    #[must_use]
    pub fn completed(&self) -> bool {
        !self.summary.state.is_aborted()
    }
}

/// Outcome of [`crate::check_job`].
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub job: String,
    pub backend: Backend,
    pub statement: CompiledStatement,
    pub input_columns: Vec<String>,
    pub input_rows: u64,
    /// `None` when a session could be opened and closed.
    pub session_error: Option<String>,
}

impl CheckReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.session_error.is_none()
    }
}
