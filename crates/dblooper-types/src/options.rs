//! Per-job loop behaviour switches.

use serde::{Deserialize, Serialize};

/// Immutable options handed to the execution loop.
///
/// Defaults: input columns are appended, empty results are skipped, only
/// produced columns are kept, and row failures do not stop the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct LoopOptions {
    /// Prefix every output row with the originating input row's columns.
    pub append_input_columns: bool,
    /// Emit a null-filled row when an input row yields no result rows.
    /// Only observable together with `append_input_columns`.
    pub include_empty_results: bool,
    /// Keep input columns in the output schema even when not appending.
    pub retain_all_columns: bool,
    /// Abort on the first failed row.
    pub fail_fast: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            append_input_columns: true,
            include_empty_results: false,
            retain_all_columns: false,
            fail_fast: false,
        }
    }
}

impl LoopOptions {
    /// Whether input columns form the leading part of the output schema.
    #[must_use]
    pub fn carries_input_columns(&self) -> bool {
        self.append_input_columns || self.retain_all_columns
    }

    /// Whether an input row with zero result rows produces a placeholder row.
    #[must_use]
    pub fn emits_empty_placeholder(&self) -> bool {
        self.include_empty_results && self.append_input_columns
    }
}
