//! JSON Lines input and output for file-driven jobs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dblooper_types::{ColumnSpec, DataType, ErrorRecord, Row, Schema, Value};

use crate::sink::RowSink;
use crate::source::RowSource;

/// Reads one JSON object per line.
///
/// The file is read up front so the row count is known before the loop
/// starts. Blank lines are skipped and do not count as rows.
#[derive(Debug)]
pub struct JsonLinesSource {
    schema: Arc<Schema>,
    lines: std::vec::IntoIter<(usize, String)>,
    total: u64,
}

impl JsonLinesSource {
    /// Open `path`, using `declared` as the input schema or inferring it
    /// from the first line's keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or the first line can't
    /// be parsed while inferring the schema.
    pub fn open(path: &Path, declared: Option<&[ColumnSpec]>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?;
        Self::from_str_with(&content, declared)
            .with_context(|| format!("Invalid input file: {}", path.display()))
    }

    /// # Errors
    ///
    /// See [`JsonLinesSource::open`].
    pub fn from_str_with(content: &str, declared: Option<&[ColumnSpec]>) -> Result<Self> {
        let lines: Vec<(usize, String)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| (n + 1, line.to_string()))
            .collect();

        let schema = match declared {
            Some(columns) => Schema::new(columns.to_vec()),
            None => match lines.first() {
                Some((n, line)) => infer_schema(line).with_context(|| format!("line {n}"))?,
                None => Schema::default(),
            },
        };
        tracing::debug!(
            columns = schema.len(),
            rows = lines.len(),
            inferred = declared.is_none(),
            "Input loaded"
        );

        Ok(Self {
            schema: Arc::new(schema),
            total: lines.len() as u64,
            lines: lines.into_iter(),
        })
    }
}

impl RowSource for JsonLinesSource {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn total_rows(&self) -> u64 {
        self.total
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let Some((n, line)) = self.lines.next() else {
            return Ok(None);
        };
        let row = parse_row(&self.schema, &line).with_context(|| format!("line {n}"))?;
        Ok(Some(row))
    }
}

fn parse_object(line: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str(line).context("not valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object, got {other}"),
    }
}

fn infer_schema(line: &str) -> Result<Schema> {
    parse_object(line)?
        .into_iter()
        .map(|(name, raw)| {
            let value = to_value(&name, raw)?;
            Ok(ColumnSpec::new(name, value.data_type()))
        })
        .collect()
}

fn parse_row(schema: &Arc<Schema>, line: &str) -> Result<Row> {
    let mut object = parse_object(line)?;
    let values = schema
        .columns()
        .iter()
        .map(|column| match object.remove(&column.name) {
            Some(raw) => conform(column, to_value(&column.name, raw)?),
            None => Ok(Value::Null),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::new(Arc::clone(schema), values))
}

fn to_value(column: &str, raw: serde_json::Value) -> Result<Value> {
    serde_json::from_value(raw)
        .with_context(|| format!("column '{column}' holds a value that is not a scalar"))
}

/// Check a value against its declared column type. Integers widen to float.
#[allow(clippy::cast_precision_loss)]
fn conform(column: &ColumnSpec, value: Value) -> Result<Value> {
    match (column.data_type, value) {
        (DataType::Float, Value::Integer(v)) => Ok(Value::Float(v as f64)),
        (DataType::Any, v) => Ok(v),
        (_, Value::Null) => Ok(Value::Null),
        (expected, v) if v.data_type() == expected => Ok(v),
        (expected, v) => bail!(
            "column '{}' is declared {expected} but holds {}",
            column.name,
            v.data_type()
        ),
    }
}

/// Writes success rows and error records as two JSON Lines files.
pub struct JsonLinesSink {
    rows: BufWriter<File>,
    errors: BufWriter<File>,
}

impl JsonLinesSink {
    /// Create (truncating) both output files, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if either file can't be created.
    pub fn create(rows_path: &Path, errors_path: &Path) -> Result<Self> {
        Ok(Self {
            rows: create_writer(rows_path)?,
            errors: create_writer(errors_path)?,
        })
    }

    /// Flush both files.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered output can't be written.
    pub fn finish(mut self) -> Result<()> {
        self.rows.flush().context("Failed to flush row output")?;
        self.errors.flush().context("Failed to flush error output")?;
        Ok(())
    }
}

fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    Ok(BufWriter::new(file))
}

impl RowSink for JsonLinesSink {
    fn on_schema(&mut self, schema: &Arc<Schema>) -> Result<()> {
        tracing::debug!(columns = ?schema.names().collect::<Vec<_>>(), "Output schema fixed");
        Ok(())
    }

    fn on_row(&mut self, _row_index: u64, row: Row) -> Result<()> {
        serde_json::to_writer(&mut self.rows, &row.to_json())?;
        self.rows.write_all(b"\n")?;
        Ok(())
    }

    fn on_error(&mut self, record: ErrorRecord) -> Result<()> {
        serde_json::to_writer(&mut self.errors, &record)?;
        self.errors.write_all(b"\n")?;
        Ok(())
    }
}
