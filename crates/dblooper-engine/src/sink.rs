//! Destination for the success and error sequences.

use std::sync::Arc;

use anyhow::Result;
use dblooper_types::{ErrorRecord, Row, Schema};

/// Receives loop output.
///
/// Success rows and error records each arrive in ascending input-row order.
/// The two sequences are independent; `row_index` correlates them.
pub trait RowSink {
    /// Called once with the fixed output schema, before the first success row.
    ///
    /// # Errors
    ///
    /// Implementations return an error if the schema can't be recorded.
    fn on_schema(&mut self, schema: &Arc<Schema>) -> Result<()> {
        let _ = schema;
        Ok(())
    }

    /// # Errors
    ///
    /// Implementations return an error if the row can't be written.
    fn on_row(&mut self, row_index: u64, row: Row) -> Result<()>;

    /// # Errors
    ///
    /// Implementations return an error if the record can't be written.
    fn on_error(&mut self, record: ErrorRecord) -> Result<()>;
}

/// Keeps both sequences in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub schema: Option<Arc<Schema>>,
    pub rows: Vec<(u64, Row)>,
    pub errors: Vec<ErrorRecord>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Input indices of the success rows, in emission order.
    #[must_use]
    pub fn row_indices(&self) -> Vec<u64> {
        self.rows.iter().map(|(i, _)| *i).collect()
    }

    /// Input indices of the error records, in emission order.
    #[must_use]
    pub fn error_indices(&self) -> Vec<u64> {
        self.errors.iter().map(|e| e.row_index).collect()
    }
}

impl RowSink for CollectingSink {
    fn on_schema(&mut self, schema: &Arc<Schema>) -> Result<()> {
        self.schema = Some(Arc::clone(schema));
        Ok(())
    }

    fn on_row(&mut self, row_index: u64, row: Row) -> Result<()> {
        self.rows.push((row_index, row));
        Ok(())
    }

    fn on_error(&mut self, record: ErrorRecord) -> Result<()> {
        self.errors.push(record);
        Ok(())
    }
}
