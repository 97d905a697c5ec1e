//! Semantic validation for parsed job configuration values.

use anyhow::{bail, Result};

use crate::config::types::JobConfig;

/// Validate a parsed job configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// Template and column checks happen later, at compile and configure time.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the job config.
pub fn validate_job(config: &JobConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported job version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.job.trim().is_empty() {
        errors.push("Job name must not be empty".to_string());
    }

    if config.statement.trim().is_empty() {
        errors.push("Statement must not be empty".to_string());
    }

    if config.database.connection.trim().is_empty() {
        errors.push("Database connection must not be empty".to_string());
    }

    let has_upstream = config
        .database
        .upstream_query
        .as_deref()
        .is_some_and(|q| !q.trim().is_empty());
    if config.options.require_upstream_placeholder && !has_upstream {
        errors.push(
            "require_upstream_placeholder is set but database.upstream_query is missing"
                .to_string(),
        );
    }

    if config.database.statement_timeout_ms == Some(0) {
        errors.push("statement_timeout_ms must be > 0".to_string());
    }

    if config.progress_every == 0 {
        errors.push("progress_every must be at least 1".to_string());
    }

    if let Some(columns) = &config.input.columns {
        if columns.is_empty() {
            errors.push("input.columns must declare at least one column".to_string());
        }
        for (i, column) in columns.iter().enumerate() {
            if column.name.trim().is_empty() {
                errors.push(format!("input.columns[{i}] has an empty name"));
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                errors.push(format!("input column '{}' is declared twice", column.name));
            }
        }
    }

    if config.output.rows == config.output.errors {
        errors.push("output.rows and output.errors must be different files".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Job validation failed:\n  - {}", errors.join("\n  - "));
    }
}
