use std::path::Path;

use anyhow::Result;

use dblooper_db::factory_for;
use dblooper_engine::compile_job;

/// Execute the `compile` command: print the executable SQL and the input
/// column bound to each marker. Does not connect.
pub fn execute(job_path: &Path) -> Result<()> {
    let config = super::load_job(job_path)?;
    let style = factory_for(&config.database.connect_options()).param_style();
    let statement = compile_job(&config, style)?;

    println!("{}", statement.sql);
    for (i, column) in statement.column_refs.iter().enumerate() {
        println!("  {} -> {column}", style.marker(i));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::write_job;

    #[test]
    fn compile_does_not_touch_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let job = write_job(dir.path(), "SELECT name FROM #table# WHERE id = #{id}#");
        execute(&job).unwrap();
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn compile_reports_unknown_variable() {
        let dir = tempfile::tempdir().unwrap();
        let job = write_job(dir.path(), "SELECT * FROM #table# WHERE r = '$${Snowhere}$$'");
        let err = execute(&job).unwrap_err();
        assert!(format!("{err:#}").contains("unknown variable 'nowhere'"));
    }
}
