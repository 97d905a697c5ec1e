//! End-to-end loop runs against an in-memory SQLite database.

use std::sync::Arc;

use rstest::rstest;

use dblooper_db::SqliteSessionFactory;
use dblooper_engine::progress::NoProgress;
use dblooper_engine::variables::NoVariables;
use dblooper_engine::{
    compile, AbortReason, CollectingSink, CompileOptions, LoopError, LoopState, Looper, VecSource,
};
use dblooper_types::{LoopOptions, Schema, Value};

const SEED: &str = "
    CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    INSERT INTO customers VALUES (1, 'ann'), (2, 'bob'), (3, 'cy');
";

fn factory() -> SqliteSessionFactory {
    SqliteSessionFactory::in_memory().with_init_sql(SEED)
}

fn ids(values: &[i64]) -> VecSource {
    VecSource::new(
        Schema::from_names(["id"]),
        values.iter().map(|&i| vec![Value::Integer(i)]).collect(),
    )
}

fn names(schema: &Schema) -> Vec<&str> {
    schema.names().collect()
}

#[test]
fn lookup_with_one_failing_row() {
    // id = 2 feeds malformed JSON to json_extract, which raises.
    let template = "SELECT id, name FROM #table# WHERE id = #{id}# \
                    AND json_extract(CASE WHEN #{id}# = 2 THEN 'oops' ELSE '{}' END, '$') IS NOT NULL";
    let stmt = compile(
        template,
        Some("SELECT * FROM customers"),
        &NoVariables,
        &CompileOptions::default(),
    )
    .unwrap();
    assert_eq!(stmt.column_refs, vec!["id", "id"]);

    let mut sink = CollectingSink::new();
    let summary = Looper::new(&stmt, LoopOptions::default())
        .run(&factory(), &mut ids(&[1, 2, 3]), &mut sink, &mut NoProgress)
        .unwrap();

    assert_eq!(summary.state, LoopState::Completed);
    assert_eq!(summary.rows_processed, 3);
    assert_eq!(sink.row_indices(), vec![0, 2]);
    assert_eq!(sink.error_indices(), vec![1]);
    assert!(sink.errors[0].error_message.contains("malformed JSON"));
    assert_eq!(sink.errors[0].row_data, r#"{"id":2}"#);

    let schema = sink.schema.unwrap();
    assert_eq!(names(&schema), vec!["id", "id (#1)", "name"]);
    assert_eq!(
        sink.rows[1].1.values(),
        &[Value::Integer(3), Value::Integer(3), Value::Text("cy".into())]
    );
}

#[test]
fn fail_fast_keeps_earlier_output() {
    let stmt = compile(
        "SELECT json_extract(#{id}#, '$') AS v",
        None,
        &NoVariables,
        &CompileOptions::default(),
    )
    .unwrap();
    // Integers are valid JSON; the text row is not.
    let mut source = VecSource::new(
        Schema::from_names(["id"]),
        vec![
            vec![Value::Integer(1)],
            vec![Value::Text("nope".into())],
            vec![Value::Integer(3)],
        ],
    );
    let opts = LoopOptions {
        fail_fast: true,
        ..LoopOptions::default()
    };
    let mut sink = CollectingSink::new();
    let summary = Looper::new(&stmt, opts)
        .run(&factory(), &mut source, &mut sink, &mut NoProgress)
        .unwrap();

    assert_eq!(summary.state, LoopState::Aborted(AbortReason::FailFast));
    assert_eq!(summary.rows_processed, 2);
    assert_eq!(sink.row_indices(), vec![0]);
    assert_eq!(sink.error_indices(), vec![1]);
}

#[test]
fn dml_statements_yield_no_rows() {
    let stmt = compile(
        "UPDATE customers SET name = upper(name) WHERE id = #{id}#",
        None,
        &NoVariables,
        &CompileOptions::default(),
    )
    .unwrap();
    let opts = LoopOptions {
        include_empty_results: true,
        ..LoopOptions::default()
    };
    let mut sink = CollectingSink::new();
    let summary = Looper::new(&stmt, opts)
        .run(&factory(), &mut ids(&[1, 2]), &mut sink, &mut NoProgress)
        .unwrap();

    // Only the null-filled placeholders, one per input row.
    assert_eq!(summary.success_rows, 2);
    assert_eq!(names(sink.schema.as_ref().unwrap()), vec!["id"]);
    assert!(sink.errors.is_empty());
}

#[test]
fn unknown_column_is_a_configuration_error() {
    let stmt = compile(
        "SELECT * FROM customers WHERE id = #{customer_id}#",
        None,
        &NoVariables,
        &CompileOptions::default(),
    )
    .unwrap();
    let err = Looper::new(&stmt, LoopOptions::default())
        .run(
            &factory(),
            &mut ids(&[1]),
            &mut CollectingSink::new(),
            &mut NoProgress,
        )
        .unwrap_err();
    assert!(matches!(err, LoopError::Configuration(_)));
    assert_eq!(
        err.to_string(),
        "Column customer_id doesn't exist in the input table."
    );
}

#[test]
fn session_open_failure_is_reported() {
    let stmt = compile("SELECT 1", None, &NoVariables, &CompileOptions::default()).unwrap();
    let broken = SqliteSessionFactory::in_memory().with_init_sql("THIS IS NOT SQL");
    let err = Looper::new(&stmt, LoopOptions::default())
        .run(
            &broken,
            &mut ids(&[1]),
            &mut CollectingSink::new(),
            &mut NoProgress,
        )
        .unwrap_err();
    assert!(matches!(err, LoopError::Session(_)));
}

#[rstest]
#[case::defaults(true, false, false, &["id", "name"], 1)]
#[case::append_with_empty(true, true, false, &["id", "name"], 2)]
#[case::result_only(false, false, false, &["name"], 1)]
#[case::empty_needs_append(false, true, false, &["name"], 1)]
#[case::retain_without_append(false, false, true, &["id", "name"], 1)]
#[case::retain_and_append(true, false, true, &["id", "name"], 1)]
fn option_matrix(
    #[case] append_input_columns: bool,
    #[case] include_empty_results: bool,
    #[case] retain_all_columns: bool,
    #[case] expected_columns: &[&str],
    #[case] expected_rows: usize,
) {
    let stmt = compile(
        "SELECT name FROM customers WHERE id = #{id}#",
        None,
        &NoVariables,
        &CompileOptions::default(),
    )
    .unwrap();
    let opts = LoopOptions {
        append_input_columns,
        include_empty_results,
        retain_all_columns,
        fail_fast: false,
    };
    let mut sink = CollectingSink::new();
    // id 9 has no match.
    Looper::new(&stmt, opts)
        .run(&factory(), &mut ids(&[1, 9]), &mut sink, &mut NoProgress)
        .unwrap();

    let schema: Arc<Schema> = sink.schema.clone().unwrap();
    assert_eq!(names(&schema), expected_columns);
    assert_eq!(sink.rows.len(), expected_rows);
    for (_, row) in &sink.rows {
        assert_eq!(row.values().len(), schema.len());
    }
    if expected_rows == 2 {
        assert_eq!(sink.rows[1].1.get("name"), Some(&Value::Null));
    }
}
