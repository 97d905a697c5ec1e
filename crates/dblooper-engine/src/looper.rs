//! The execution loop: bind, execute, classify, and route one input row at
//! a time over a single database session.
//!
//! ```text
//! Idle ──run──▶ Running ──source exhausted──▶ Completed
//!                  │
//!                  ├─ row failed && fail_fast ─▶ Aborted(FailFast)
//!                  ├─ cancellation observed ───▶ Aborted(Cancelled)
//!                  └─ session unusable ────────▶ Aborted(Fatal)  (returned as Err)
//! ```
//!
//! Rows run strictly in input order; cancellation is checked between rows,
//! never during a statement.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dblooper_db::{DbError, DbSession, SessionFactory};
use dblooper_types::{LoopOptions, ResultSet, Row, Schema, Value};

use crate::assembler::ResultAssembler;
use crate::binder::RowBinder;
use crate::errors::{LoopError, RowError};
use crate::progress::ProgressReporter;
use crate::router::ErrorRouter;
use crate::sink::RowSink;
use crate::source::RowSource;
use crate::template::CompiledStatement;

/// Why a loop stopped before exhausting its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    FailFast,
    Cancelled,
    Fatal,
}

/// Loop lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Completed,
    Aborted(AbortReason),
}

impl LoopState {
    #[must_use]
    pub fn is_aborted(self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running => f.write_str("running"),
            Self::Completed => f.write_str("completed"),
            Self::Aborted(AbortReason::FailFast) => f.write_str("aborted (row failed)"),
            Self::Aborted(AbortReason::Cancelled) => f.write_str("aborted (cancelled)"),
            Self::Aborted(AbortReason::Fatal) => f.write_str("aborted (session unusable)"),
        }
    }
}

/// Cooperative cancellation flag shared between the loop and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A failed input row on its way to the error sequence.
#[derive(Debug, Clone)]
pub struct RowFailure {
    pub row_index: u64,
    pub original_row: Row,
    pub message: String,
}

/// Result of processing one input row. Lives for a single iteration.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Success { rows: Vec<Row> },
    Failure(RowFailure),
}

/// What a finished (or aborted) run did.
#[derive(Debug, Clone)]
pub struct LoopSummary {
    pub state: LoopState,
    pub rows_processed: u64,
    pub total_rows: u64,
    pub success_rows: u64,
    pub error_rows: u64,
    pub output_schema: Arc<Schema>,
    pub duration_secs: f64,
}

/// Owns the loop's only session and closes it exactly once, on every exit
/// path including early returns and panics.
struct SessionGuard {
    session: Option<Box<dyn DbSession>>,
    backend: &'static str,
}

impl SessionGuard {
    fn acquire(factory: &dyn SessionFactory) -> Result<Self, DbError> {
        let session = factory.open()?;
        tracing::debug!(backend = factory.backend_name(), "Database session acquired");
        Ok(Self {
            session: Some(session),
            backend: factory.backend_name(),
        })
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet, DbError> {
        match self.session.as_mut() {
            Some(session) => session.execute(sql, params),
            None => Err(DbError::Connection("session already released".into())),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match session.close() {
            Ok(()) => tracing::debug!(backend = self.backend, "Database session released"),
            Err(e) => tracing::warn!(
                backend = self.backend,
                error = %e,
                "Database session close failed"
            ),
        }
    }
}

/// Runs one compiled statement over every row of a [`RowSource`].
pub struct Looper<'a> {
    statement: &'a CompiledStatement,
    options: LoopOptions,
    cancel: CancellationToken,
    state: LoopState,
}

impl<'a> Looper<'a> {
    #[must_use]
    pub fn new(statement: &'a CompiledStatement, options: LoopOptions) -> Self {
        Self {
            statement,
            options,
            cancel: CancellationToken::new(),
            state: LoopState::Idle,
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Execute the statement once per input row.
    ///
    /// Column references are validated against the source schema before the
    /// session is opened. Fail-fast and cancellation aborts are reported in
    /// [`LoopSummary::state`]; output already routed to `sink` stays there.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Configuration`] before any row runs,
    /// [`LoopError::Session`] if the session can't be opened,
    /// [`LoopError::Fatal`] if it becomes unusable mid-run, and
    /// [`LoopError::Input`] / [`LoopError::Sink`] for collaborator failures.
    pub fn run(
        mut self,
        factory: &dyn SessionFactory,
        source: &mut dyn RowSource,
        sink: &mut dyn RowSink,
        progress: &mut dyn ProgressReporter,
    ) -> Result<LoopSummary, LoopError> {
        let started = Instant::now();
        let input_schema = Arc::clone(source.schema());
        let binder = RowBinder::new(Arc::clone(&input_schema), &self.statement.column_refs)?;
        let mut assembler = ResultAssembler::new(input_schema, self.options);
        let mut router = ErrorRouter::default();
        let total_rows = source.total_rows();

        let mut session = SessionGuard::acquire(factory).map_err(LoopError::Session)?;
        self.transition(LoopState::Running);
        tracing::debug!(
            sql = self.statement.sql.as_str(),
            params = self.statement.param_count(),
            total_rows,
            "Loop started"
        );

        let mut processed = 0_u64;
        let mut success_rows = 0_u64;

        let terminal = loop {
            if self.cancel.is_cancelled() {
                break LoopState::Aborted(AbortReason::Cancelled);
            }
            let row = match source.next_row() {
                Ok(Some(row)) => row,
                Ok(None) => break LoopState::Completed,
                Err(error) => {
                    return Err(LoopError::Input {
                        row_index: processed,
                        error,
                    })
                }
            };
            let row_index = processed;

            let outcome = match binder.bind(&row) {
                Err(e) => failure(row_index, row, &e),
                Ok(params) => match session.execute(&self.statement.sql, &params) {
                    Ok(result) => {
                        let assembled = assembler.assemble(&row, &result);
                        if let Some(schema) = &assembled.new_schema {
                            sink.on_schema(schema).map_err(LoopError::Sink)?;
                        }
                        ExecutionOutcome::Success {
                            rows: assembled.rows,
                        }
                    }
                    Err(err) if err.is_fatal() => {
                        self.transition(LoopState::Aborted(AbortReason::Fatal));
                        tracing::error!(row_index, error = %err, "Database session unusable");
                        return Err(LoopError::Fatal {
                            row_index,
                            source: err,
                        });
                    }
                    Err(e) => failure(row_index, row, &RowError::Execution(e.to_string())),
                },
            };

            let failed = match outcome {
                ExecutionOutcome::Success { rows } => {
                    for out in rows {
                        sink.on_row(row_index, out).map_err(LoopError::Sink)?;
                        success_rows += 1;
                    }
                    false
                }
                ExecutionOutcome::Failure(f) => {
                    router.route(sink, f).map_err(LoopError::Sink)?;
                    true
                }
            };

            processed += 1;
            progress.report(processed, total_rows);

            if failed && self.options.fail_fast {
                break LoopState::Aborted(AbortReason::FailFast);
            }
        };

        let output_schema = match assembler.finish() {
            Some(schema) => {
                sink.on_schema(&schema).map_err(LoopError::Sink)?;
                schema
            }
            None => assembler.output_schema().cloned().unwrap_or_default(),
        };
        drop(session);
        self.transition(terminal);

        let summary = LoopSummary {
            state: terminal,
            rows_processed: processed,
            total_rows,
            success_rows,
            error_rows: router.routed(),
            output_schema,
            duration_secs: started.elapsed().as_secs_f64(),
        };
        tracing::info!(
            state = %summary.state,
            processed = summary.rows_processed,
            success_rows = summary.success_rows,
            error_rows = summary.error_rows,
            "Loop finished"
        );
        Ok(summary)
    }

    fn transition(&mut self, next: LoopState) {
        tracing::trace!(from = %self.state, to = %next, "Loop state change");
        self.state = next;
    }
}

fn failure(row_index: u64, row: Row, error: &RowError) -> ExecutionOutcome {
    ExecutionOutcome::Failure(RowFailure {
        row_index,
        original_row: row,
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use dblooper_db::{error, ParamStyle};

    use super::*;
    use crate::progress::NoProgress;
    use crate::sink::CollectingSink;
    use crate::source::VecSource;

    /// Scripted session: `respond` decides each execution's outcome from
    /// the bound parameters.
    type Responder = dyn Fn(&[Value]) -> error::Result<ResultSet> + Send + Sync;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
        executed: Mutex<Vec<Vec<Value>>>,
    }

    struct ScriptedFactory {
        counters: Arc<Counters>,
        respond: Arc<Responder>,
    }

    struct ScriptedSession {
        counters: Arc<Counters>,
        respond: Arc<Responder>,
    }

    impl SessionFactory for ScriptedFactory {
        fn open(&self) -> error::Result<Box<dyn DbSession>> {
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedSession {
                counters: Arc::clone(&self.counters),
                respond: Arc::clone(&self.respond),
            }))
        }

        fn param_style(&self) -> ParamStyle {
            ParamStyle::Question
        }

        fn backend_name(&self) -> &'static str {
            "scripted"
        }
    }

    impl DbSession for ScriptedSession {
        fn execute(&mut self, _sql: &str, params: &[Value]) -> error::Result<ResultSet> {
            self.counters.executed.lock().unwrap().push(params.to_vec());
            (self.respond)(params)
        }

        fn close(self: Box<Self>) -> error::Result<()> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn factory(
        respond: impl Fn(&[Value]) -> error::Result<ResultSet> + Send + Sync + 'static,
    ) -> (ScriptedFactory, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            ScriptedFactory {
                counters: Arc::clone(&counters),
                respond: Arc::new(respond),
            },
            counters,
        )
    }

    fn statement() -> CompiledStatement {
        CompiledStatement {
            sql: "SELECT ? AS v".into(),
            column_refs: vec!["id".into()],
        }
    }

    fn ids(n: i64) -> VecSource {
        VecSource::new(
            Schema::from_names(["id"]),
            (0..n).map(|i| vec![Value::Integer(i)]).collect(),
        )
    }

    fn echo(params: &[Value]) -> error::Result<ResultSet> {
        Ok(ResultSet::new(vec!["v".into()], vec![params.to_vec()]))
    }

    fn fail_even(params: &[Value]) -> error::Result<ResultSet> {
        match params[0].as_i64() {
            Some(i) if i % 2 == 0 => Err(DbError::Statement(format!("row {i} rejected"))),
            _ => echo(params),
        }
    }

    #[test]
    fn completes_and_releases_session_once() {
        let (f, counters) = factory(echo);
        let stmt = statement();
        let mut sink = CollectingSink::new();
        let summary = Looper::new(&stmt, LoopOptions::default())
            .run(&f, &mut ids(3), &mut sink, &mut NoProgress)
            .unwrap();

        assert_eq!(summary.state, LoopState::Completed);
        assert_eq!(summary.rows_processed, 3);
        assert_eq!(summary.success_rows, 3);
        assert_eq!(sink.row_indices(), vec![0, 1, 2]);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_are_isolated_and_ordered() {
        let (f, _) = factory(fail_even);
        let stmt = statement();
        let mut sink = CollectingSink::new();
        let summary = Looper::new(&stmt, LoopOptions::default())
            .run(&f, &mut ids(6), &mut sink, &mut NoProgress)
            .unwrap();

        assert_eq!(summary.state, LoopState::Completed);
        assert_eq!(sink.row_indices(), vec![1, 3, 5]);
        assert_eq!(sink.error_indices(), vec![0, 2, 4]);
        assert_eq!(sink.errors[1].error_message, "row 2 rejected");
        assert_eq!(summary.error_rows, 3);
    }

    #[test]
    fn fail_fast_stops_after_first_failure() {
        let (f, counters) = factory(|params| match params[0].as_i64() {
            Some(2) => Err(DbError::Statement("boom".into())),
            _ => echo(params),
        });
        let stmt = statement();
        let mut sink = CollectingSink::new();
        let opts = LoopOptions {
            fail_fast: true,
            ..LoopOptions::default()
        };
        let summary = Looper::new(&stmt, opts)
            .run(&f, &mut ids(5), &mut sink, &mut NoProgress)
            .unwrap();

        assert_eq!(summary.state, LoopState::Aborted(AbortReason::FailFast));
        assert_eq!(sink.errors.len(), 1);
        assert_eq!(sink.errors[0].row_index, 2);
        assert_eq!(sink.row_indices(), vec![0, 1]);
        // Rows 3 and 4 never reached the database.
        assert_eq!(counters.executed.lock().unwrap().len(), 3);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fatal_error_aborts_and_still_releases() {
        let (f, counters) = factory(|params| match params[0].as_i64() {
            Some(1) => Err(DbError::Connection("server closed the connection".into())),
            _ => echo(params),
        });
        let stmt = statement();
        let mut sink = CollectingSink::new();
        let err = Looper::new(&stmt, LoopOptions::default())
            .run(&f, &mut ids(4), &mut sink, &mut NoProgress)
            .unwrap_err();

        assert!(matches!(err, LoopError::Fatal { row_index: 1, .. }));
        assert_eq!(sink.row_indices(), vec![0]);
        assert!(sink.errors.is_empty());
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_is_observed_between_rows() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let (f, counters) = factory(move |params| {
            if params[0].as_i64() == Some(1) {
                trigger.cancel();
            }
            echo(params)
        });
        let stmt = statement();
        let mut sink = CollectingSink::new();
        let summary = Looper::new(&stmt, LoopOptions::default())
            .with_cancellation(token)
            .run(&f, &mut ids(5), &mut sink, &mut NoProgress)
            .unwrap();

        assert_eq!(summary.state, LoopState::Aborted(AbortReason::Cancelled));
        // The in-flight row finishes and stays routed.
        assert_eq!(sink.row_indices(), vec![0, 1]);
        assert_eq!(counters.executed.lock().unwrap().len(), 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_column_fails_before_session_opens() {
        let (f, counters) = factory(echo);
        let stmt = CompiledStatement {
            sql: "SELECT ?".into(),
            column_refs: vec!["email".into()],
        };
        let mut sink = CollectingSink::new();
        let err = Looper::new(&stmt, LoopOptions::default())
            .run(&f, &mut ids(2), &mut sink, &mut NoProgress)
            .unwrap_err();

        assert!(matches!(err, LoopError::Configuration(_)));
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn bind_failure_is_routed_like_execution_failure() {
        let (f, counters) = factory(echo);
        let stmt = statement();
        let declared = Arc::new(Schema::from_names(["id"]));
        let foreign = Arc::new(Schema::from_names(["other"]));
        let mut source = VecSource::from_rows(
            declared.clone(),
            vec![
                Row::new(declared.clone(), vec![Value::Integer(0)]),
                Row::new(foreign, vec![Value::Integer(1)]),
                Row::new(declared, vec![Value::Integer(2)]),
            ],
        );
        let mut sink = CollectingSink::new();
        Looper::new(&stmt, LoopOptions::default())
            .run(&f, &mut source, &mut sink, &mut NoProgress)
            .unwrap();

        assert_eq!(sink.row_indices(), vec![0, 2]);
        assert_eq!(sink.error_indices(), vec![1]);
        assert!(sink.errors[0].error_message.contains("'id'"));
        assert_eq!(counters.executed.lock().unwrap().len(), 2);
    }

    #[test]
    fn bind_failure_aborts_under_fail_fast() {
        let (f, counters) = factory(echo);
        let stmt = statement();
        let declared = Arc::new(Schema::from_names(["id"]));
        let foreign = Arc::new(Schema::from_names(["other"]));
        let mut source = VecSource::from_rows(
            declared.clone(),
            vec![
                Row::new(declared.clone(), vec![Value::Integer(0)]),
                Row::new(foreign, vec![Value::Integer(1)]),
                Row::new(declared, vec![Value::Integer(2)]),
            ],
        );
        let mut sink = CollectingSink::new();
        let opts = LoopOptions {
            fail_fast: true,
            ..LoopOptions::default()
        };
        let summary = Looper::new(&stmt, opts)
            .run(&f, &mut source, &mut sink, &mut NoProgress)
            .unwrap();

        assert_eq!(summary.state, LoopState::Aborted(AbortReason::FailFast));
        assert_eq!(sink.error_indices(), vec![1]);
        assert_eq!(sink.row_indices(), vec![0]);
        // The unbindable row never executes and neither does row 2.
        assert_eq!(
            *counters.executed.lock().unwrap(),
            vec![vec![Value::Integer(0)]]
        );
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn progress_is_monotonic_and_complete() {
        let (f, _) = factory(fail_even);
        let stmt = statement();
        let mut seen = Vec::new();
        let mut reporter = |p: u64, t: u64| seen.push((p, t));
        Looper::new(&stmt, LoopOptions::default())
            .run(&f, &mut ids(4), &mut CollectingSink::new(), &mut reporter)
            .unwrap();

        assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[test]
    fn schema_reported_even_without_results() {
        let (f, _) = factory(|_| Ok(ResultSet::empty()));
        let stmt = statement();
        let mut sink = CollectingSink::new();
        let summary = Looper::new(&stmt, LoopOptions::default())
            .run(&f, &mut ids(2), &mut sink, &mut NoProgress)
            .unwrap();

        assert!(sink.rows.is_empty());
        let schema = sink.schema.expect("schema reported");
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["id"]);
        assert_eq!(summary.output_schema, schema);
    }
}
