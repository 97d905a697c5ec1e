//! Builds success-sequence rows from input rows and statement results.
//!
//! The output schema is fixed by the first result set that declares columns
//! (or the first row that must be emitted, whichever comes first). Later
//! result sets are reconciled to it by column name: missing columns become
//! null, extra columns are dropped with a warning.

use std::collections::HashSet;
use std::sync::Arc;

use dblooper_types::{ColumnSpec, DataType, LoopOptions, ResultSet, Row, Schema, Value};

/// Output of assembling one input row's results.
#[derive(Debug, Default)]
pub struct Assembled {
    pub rows: Vec<Row>,
    /// Set on the call that fixed the output schema.
    pub new_schema: Option<Arc<Schema>>,
}

#[derive(Debug)]
struct Layout {
    schema: Arc<Schema>,
    /// Result column names as the database reported them, in output order.
    result_names: Vec<String>,
}

/// Stateful row assembler for one loop run.
#[derive(Debug)]
pub struct ResultAssembler {
    options: LoopOptions,
    input_schema: Arc<Schema>,
    layout: Option<Layout>,
    warned: HashSet<String>,
}

impl ResultAssembler {
    #[must_use]
    pub fn new(input_schema: Arc<Schema>, options: LoopOptions) -> Self {
        Self {
            options,
            input_schema,
            layout: None,
            warned: HashSet::new(),
        }
    }

    #[must_use]
    pub fn output_schema(&self) -> Option<&Arc<Schema>> {
        self.layout.as_ref().map(|l| &l.schema)
    }

    /// Assemble the success rows for `input` from `result`.
    pub fn assemble(&mut self, input: &Row, result: &ResultSet) -> Assembled {
        let emits_rows = !result.rows.is_empty() || self.options.emits_empty_placeholder();

        let mut new_schema = None;
        if self.layout.is_none() && (!result.columns.is_empty() || emits_rows) {
            let layout = self.build_layout(result);
            new_schema = Some(Arc::clone(&layout.schema));
            self.layout = Some(layout);
        }

        let Some(layout) = &self.layout else {
            return Assembled::default();
        };
        let schema = Arc::clone(&layout.schema);
        let result_width = layout.result_names.len();
        let prefix = self.input_values(input);

        let mut rows = Vec::with_capacity(result.rows.len().max(1));
        if result.rows.is_empty() {
            if self.options.emits_empty_placeholder() {
                let mut values = prefix;
                values.resize(values.len() + result_width, Value::Null);
                rows.push(Row::new(schema, values));
            }
            return Assembled { rows, new_schema };
        }

        if result.columns == layout.result_names {
            for result_row in &result.rows {
                let mut values = prefix.clone();
                values.extend(result_row.iter().cloned());
                rows.push(Row::new(Arc::clone(&schema), values));
            }
        } else {
            let (mapping, extras) = reconcile(&layout.result_names, &result.columns);
            let missing: Vec<String> = layout
                .result_names
                .iter()
                .zip(&mapping)
                .filter(|(_, pos)| pos.is_none())
                .map(|(name, _)| name.clone())
                .collect();
            let extra: Vec<String> = extras.iter().map(|&i| result.columns[i].clone()).collect();

            for result_row in &result.rows {
                let mut values = prefix.clone();
                values.extend(
                    mapping
                        .iter()
                        .map(|pos| pos.and_then(|i| result_row.get(i).cloned()).unwrap_or(Value::Null)),
                );
                rows.push(Row::new(Arc::clone(&schema), values));
            }

            for name in missing {
                self.warn_once(&name, "Result column missing for this row, filling with null");
            }
            for name in extra {
                self.warn_once(&name, "Result column not in output schema, dropping it");
            }
        }

        Assembled { rows, new_schema }
    }

    /// Fix the output schema if no result ever did, so every run ends with
    /// one. Returns the schema when this call fixed it.
    pub fn finish(&mut self) -> Option<Arc<Schema>> {
        if self.layout.is_some() {
            return None;
        }
        let layout = self.build_layout(&ResultSet::empty());
        let schema = Arc::clone(&layout.schema);
        self.layout = Some(layout);
        Some(schema)
    }

    fn input_values(&self, input: &Row) -> Vec<Value> {
        if !self.options.carries_input_columns() {
            return Vec::new();
        }
        if Arc::ptr_eq(input.schema(), &self.input_schema) {
            return input.values().to_vec();
        }
        self.input_schema
            .names()
            .map(|name| input.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn build_layout(&self, result: &ResultSet) -> Layout {
        let mut columns: Vec<ColumnSpec> = if self.options.carries_input_columns() {
            self.input_schema.columns().to_vec()
        } else {
            Vec::new()
        };
        let mut taken: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();

        let first_row = result.rows.first();
        for (i, name) in result.columns.iter().enumerate() {
            let unique = uniquify(name, &taken);
            taken.insert(unique.clone());
            let data_type = first_row
                .and_then(|r| r.get(i))
                .map_or(DataType::Any, Value::data_type);
            columns.push(ColumnSpec::new(unique, data_type));
        }

        tracing::debug!(
            columns = columns.len(),
            result_columns = result.columns.len(),
            "Output schema fixed"
        );
        Layout {
            schema: Arc::new(Schema::new(columns)),
            result_names: result.columns.clone(),
        }
    }

    fn warn_once(&mut self, column: &str, message: &str) {
        if self.warned.insert(column.to_string()) {
            tracing::warn!(column, "{message}");
        }
    }
}

/// `name`, or `name (#n)` with the smallest `n` not already taken.
fn uniquify(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let mut n = 1_u32;
    loop {
        let candidate = format!("{name} (#{n})");
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Position in `actual` for each `expected` name (duplicates match in order),
/// plus the positions of `actual` that nothing claimed.
fn reconcile(expected: &[String], actual: &[String]) -> (Vec<Option<usize>>, Vec<usize>) {
    let mut used = vec![false; actual.len()];
    let mut mapping = Vec::with_capacity(expected.len());
    for name in expected {
        let pos = (0..actual.len()).find(|&i| !used[i] && actual[i] == *name);
        if let Some(i) = pos {
            used[i] = true;
        }
        mapping.push(pos);
    }
    let extras = (0..actual.len()).filter(|&i| !used[i]).collect();
    (mapping, extras)
}
