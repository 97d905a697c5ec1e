pub mod check;
pub mod compile;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use dblooper_engine::config::{parse_job, validate_job, JobConfig};

/// Parse and validate the job file shared by every command.
fn load_job(job_path: &Path) -> Result<JobConfig> {
    let config = parse_job(job_path)
        .with_context(|| format!("Failed to parse job: {}", job_path.display()))?;
    validate_job(&config)?;
    Ok(config)
}
