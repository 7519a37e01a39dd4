use crate::output::print_json;
use std::path::Path;

use super::open_project;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, db) = open_project(root)?;
    let report = db.startup_recovery()?;
    if json {
        return print_json(&report);
    }
    println!(
        "Recovered: {} recipe(s) marked failed, {} gate(s) released",
        report.recipes_failed, report.gates_released
    );
    Ok(())
}
