//! Error-sequence record for rows whose execution failed.

use serde::{Deserialize, Serialize};

use crate::row::Row;

/// One entry of the error output sequence.
///
/// The shape is fixed regardless of the input schema: the originating row
/// is carried as its JSON serialization in `row_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Zero-based index of the input row.
    pub row_index: u64,
    /// JSON-serialized input row.
    pub row_data: String,
    /// Human-readable failure description.
    pub error_message: String,
}

impl ErrorRecord {
    #[must_use]
    pub fn new(row_index: u64, row: &Row, error_message: impl Into<String>) -> Self {
        Self {
            row_index,
            row_data: row.to_json().to_string(),
            error_message: error_message.into(),
        }
    }
}
