//! Input rows for the execution loop.

use std::sync::Arc;

use anyhow::Result;
use dblooper_types::{Row, Schema, Value};

/// Ordered, finite input with a declared schema and a known row count.
pub trait RowSource {
    fn schema(&self) -> &Arc<Schema>;

    /// Total number of rows, used for progress reporting.
    fn total_rows(&self) -> u64;

    /// Next row, or `None` once exhausted.
    ///
    /// # Errors
    ///
    /// Implementations return an error when a row can't be read.
    fn next_row(&mut self) -> Result<Option<Row>>;
}

/// In-memory rows.
#[derive(Debug)]
pub struct VecSource {
    schema: Arc<Schema>,
    rows: std::vec::IntoIter<Row>,
    total: u64,
}

impl VecSource {
    /// Rows given as value lists positioned against `schema`.
    #[must_use]
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        let schema = Arc::new(schema);
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&schema), values))
            .collect();
        Self::from_rows(schema, rows)
    }

    #[must_use]
    pub fn from_rows(schema: Arc<Schema>, rows: Vec<Row>) -> Self {
        Self {
            schema,
            total: rows.len() as u64,
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for VecSource {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn total_rows(&self) -> u64 {
        self.total
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_share_the_source_schema() {
        let mut source = VecSource::new(
            Schema::from_names(["id"]),
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        );
        assert_eq!(source.total_rows(), 2);
        let first = source.next_row().unwrap().unwrap();
        assert!(Arc::ptr_eq(first.schema(), source.schema()));
        assert!(source.next_row().unwrap().is_some());
        assert!(source.next_row().unwrap().is_none());
    }
}
