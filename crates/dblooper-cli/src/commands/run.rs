use std::path::Path;

use anyhow::Result;

use dblooper_engine::{run_job, CancellationToken, JobReport};

/// Execute the `run` command: parse, validate, and run a job.
///
/// Ctrl-C stops the loop after the row in flight; output written so far is
/// kept and the command fails.
pub async fn execute(job_path: &Path) -> Result<()> {
    // 1. Parse and validate
    let config = super::load_job(job_path)?;

    tracing::info!(
        job = config.job,
        backend = %config.database.backend,
        fail_fast = config.options.loop_options.fail_fast,
        "Job validated"
    );

    // 2. Cancel on interrupt
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current row");
                cancel.cancel();
            }
        })
    };

    // 3. Run the blocking loop off the async runtime
    let report = tokio::task::spawn_blocking(move || run_job(&config, cancel))
        .await
        .map_err(|e| anyhow::anyhow!("Job task panicked: {e}"))?;
    watcher.abort();
    let report = report?;

    print_report(&report);

    if report.completed() {
        Ok(())
    } else {
        anyhow::bail!("Job '{}' {}", report.job, report.summary.state)
    }
}

fn print_report(report: &JobReport) {
    let summary = &report.summary;
    println!("Job '{}' {}.", report.job, summary.state);
    println!(
        "  Rows processed:  {} / {}",
        summary.rows_processed, summary.total_rows
    );
    println!("  Output rows:     {}", summary.success_rows);
    println!("  Failed rows:     {}", summary.error_rows);
    println!("  Duration:        {:.2}s", summary.duration_secs);
    if summary.duration_secs > 0.0 {
        #[allow(clippy::cast_precision_loss)]
        let rate = summary.rows_processed as f64 / summary.duration_secs;
        println!("  Throughput:      {rate:.0} rows/sec");
    }
    println!("  Rows file:       {}", report.rows_path.display());
    println!("  Errors file:     {}", report.errors_path.display());

    let json = serde_json::json!({
        "job": report.job,
        "state": summary.state.to_string(),
        "rows_processed": summary.rows_processed,
        "total_rows": summary.total_rows,
        "success_rows": summary.success_rows,
        "error_rows": summary.error_rows,
        "duration_secs": summary.duration_secs,
    });
    println!("@@SUMMARY_JSON@@{json}");
}
