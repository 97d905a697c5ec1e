//! Job orchestration: wire config, compiler, database, files, and loop
//! together.

use anyhow::{Context, Result};
use dblooper_db::{factory_for, ParamStyle, SessionFactory};

use crate::binder::validate_columns;
use crate::config::JobConfig;
use crate::jsonl::{JsonLinesSink, JsonLinesSource};
use crate::looper::{CancellationToken, Looper};
use crate::progress::LogProgress;
use crate::result::{CheckReport, JobReport};
use crate::source::RowSource;
use crate::template::{compile, CompileOptions, CompiledStatement};
use crate::variables::{ChainResolver, EnvResolver, MapResolver};

/// Job `variables:` first, then the process environment.
#[must_use]
pub fn build_resolver(config: &JobConfig) -> ChainResolver {
    ChainResolver::new()
        .then(MapResolver::new(config.variables.clone()))
        .then(EnvResolver)
}

fn upstream_query(config: &JobConfig) -> Option<&str> {
    config
        .database
        .upstream_query
        .as_deref()
        .filter(|q| !q.trim().is_empty())
}

/// Compile the job's statement for the given marker style.
///
/// # Errors
///
/// Returns the [`crate::TemplateError`] raised by the compiler.
pub fn compile_job(config: &JobConfig, param_style: ParamStyle) -> Result<CompiledStatement> {
    let opts = CompileOptions {
        require_upstream_placeholder: config.options.require_upstream_placeholder,
        param_style,
    };
    let statement = compile(
        &config.statement,
        upstream_query(config),
        &build_resolver(config),
        &opts,
    )
    .with_context(|| format!("Failed to compile statement for job '{}'", config.job))?;
    tracing::debug!(
        job = config.job,
        sql = statement.sql.as_str(),
        columns = ?statement.column_refs,
        "Statement compiled"
    );
    Ok(statement)
}

/// Run a job end to end: read input, execute per row, write both outputs.
///
/// Cancellation and fail-fast aborts return `Ok`; check
/// [`JobReport::completed`].
///
/// # Errors
///
/// Returns an error if compilation, configure-time validation, file I/O, or
/// the database session fails.
pub fn run_job(config: &JobConfig, cancel: CancellationToken) -> Result<JobReport> {
    tracing::info!(
        job = config.job,
        backend = %config.database.backend,
        input = %config.input.path.display(),
        "Starting job"
    );

    let factory = factory_for(&config.database.connect_options());
    let statement = compile_job(config, factory.param_style())?;

    let mut source = JsonLinesSource::open(&config.input.path, config.input.columns.as_deref())?;
    let mut sink = JsonLinesSink::create(&config.output.rows, &config.output.errors)?;
    let mut progress = LogProgress::new(config.job.clone(), config.progress_every);

    let outcome = Looper::new(&statement, config.options.loop_options)
        .with_cancellation(cancel)
        .run(factory.as_ref(), &mut source, &mut sink, &mut progress);

    // Rows routed before a fatal error are kept.
    sink.finish()?;
    let summary = outcome.with_context(|| format!("Job '{}' failed", config.job))?;

    tracing::info!(
        job = config.job,
        state = %summary.state,
        success_rows = summary.success_rows,
        error_rows = summary.error_rows,
        duration_secs = summary.duration_secs,
        "Job finished"
    );

    Ok(JobReport {
        job: config.job.clone(),
        summary,
        rows_path: config.output.rows.clone(),
        errors_path: config.output.errors.clone(),
    })
}

/// Check a job without executing it: compile the statement, load the input
/// schema, validate column references, and open then close one session.
///
/// # Errors
///
/// Returns an error if the statement doesn't compile, the input can't be
/// read, or a referenced column is missing. Session problems are reported
/// in [`CheckReport::session_error`] instead.
pub fn check_job(config: &JobConfig) -> Result<CheckReport> {
    tracing::info!(job = config.job, "Checking job configuration");

    let factory = factory_for(&config.database.connect_options());
    let statement = compile_job(config, factory.param_style())?;

    let source = JsonLinesSource::open(&config.input.path, config.input.columns.as_deref())?;
    validate_columns(source.schema(), &statement.column_refs)?;

    let session_error = check_session(factory.as_ref()).err().map(|e| e.to_string());
    if let Some(err) = &session_error {
        tracing::warn!(job = config.job, error = err.as_str(), "Database check failed");
    }

    Ok(CheckReport {
        job: config.job.clone(),
        backend: config.database.backend,
        input_columns: source.schema().names().map(str::to_string).collect(),
        input_rows: source.total_rows(),
        statement,
        session_error,
    })
}

fn check_session(factory: &dyn SessionFactory) -> dblooper_db::error::Result<()> {
    factory.open()?.close()
}
