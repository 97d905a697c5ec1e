//! Maps input rows onto the positional parameters of a compiled statement.

use std::sync::Arc;

use dblooper_types::{Row, Schema, Value};

use crate::errors::{ConfigurationError, RowError};

/// Check once, before execution, that every referenced column exists.
///
/// # Errors
///
/// Returns [`ConfigurationError::EmptyInputSchema`] when the input declares
/// no columns and [`ConfigurationError::UnknownColumn`] for the first
/// reference missing from `schema`.
pub fn validate_columns(schema: &Schema, column_refs: &[String]) -> Result<(), ConfigurationError> {
    if schema.is_empty() {
        return Err(ConfigurationError::EmptyInputSchema);
    }
    match column_refs.iter().find(|name| !schema.contains(name)) {
        Some(missing) => Err(ConfigurationError::UnknownColumn(missing.clone())),
        None => Ok(()),
    }
}

/// Bind `row` by column name.
///
/// # Errors
///
/// Returns [`RowError::Bind`] naming the first reference the row lacks.
pub fn bind(row: &Row, column_refs: &[String]) -> Result<Vec<Value>, RowError> {
    column_refs
        .iter()
        .map(|name| {
            row.get(name).cloned().ok_or_else(|| RowError::Bind {
                column: name.clone(),
            })
        })
        .collect()
}

/// Binder with column positions resolved against the declared input schema.
///
/// Rows sharing that schema bind by position; any other row falls back to
/// the by-name check in [`bind`].
#[derive(Debug, Clone)]
pub struct RowBinder {
    schema: Arc<Schema>,
    column_refs: Vec<String>,
    positions: Vec<usize>,
}

impl RowBinder {
    /// # Errors
    ///
    /// See [`validate_columns`].
    pub fn new(schema: Arc<Schema>, column_refs: &[String]) -> Result<Self, ConfigurationError> {
        validate_columns(&schema, column_refs)?;
        let positions = column_refs
            .iter()
            .filter_map(|name| schema.index_of(name))
            .collect();
        Ok(Self {
            schema,
            column_refs: column_refs.to_vec(),
            positions,
        })
    }

    /// # Errors
    ///
    /// Returns [`RowError::Bind`] if the row's schema lacks a referenced column.
    pub fn bind(&self, row: &Row) -> Result<Vec<Value>, RowError> {
        if Arc::ptr_eq(row.schema(), &self.schema) {
            let values = row.values();
            return Ok(self.positions.iter().map(|&i| values[i].clone()).collect());
        }
        bind(row, &self.column_refs)
    }
}
