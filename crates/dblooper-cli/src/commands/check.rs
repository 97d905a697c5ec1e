use std::path::Path;

use anyhow::Result;

use dblooper_engine::check_job;

/// Execute the `check` command: validate job config, input columns, and
/// database connectivity.
pub async fn execute(job_path: &Path) -> Result<()> {
    // 1. Parse and validate job structure
    let config = super::load_job(job_path)?;
    println!("Job structure:     OK");

    // 2. Compile, load input, open a database session
    let report = tokio::task::spawn_blocking(move || check_job(&config))
        .await
        .map_err(|e| anyhow::anyhow!("Check task panicked: {e}"))??;

    println!("Statement:         OK ({} parameter(s))", report.statement.param_count());
    println!(
        "Input:             OK ({} row(s), columns: {})",
        report.input_rows,
        report.input_columns.join(", ")
    );
    match &report.session_error {
        None => println!("Database ({}):  OK", report.backend),
        Some(err) => println!("Database ({}):  FAILED\n  {err}", report.backend),
    }

    if report.passed() {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
