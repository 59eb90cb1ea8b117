use crate::cmd::{open_store, CLI_TOOL};
use crate::output::print_json;
use anyhow::Context;
use llkb_core::{Llkb, RunContext};
use std::path::Path;

pub fn run(root: &Path, force: bool, json: bool) -> anyhow::Result<()> {
    let store = open_store(root)?;
    let config = store.config();
    let mut llkb = Llkb::with_store(store, config);
    let report = llkb
        .prune(&RunContext::new(CLI_TOOL), force)
        .context("failed to prune")?;

    if json {
        return print_json(&report);
    }

    let plan = &report.plan;
    if plan.is_empty() {
        println!("Nothing to prune.");
        return Ok(());
    }

    let verb = if report.applied { "Archived" } else { "Would archive" };
    for item in plan.lessons.iter().chain(plan.components.iter()) {
        println!("{verb} {}: {}", item.id, item.reason);
    }
    let verb = if report.applied { "Deleted" } else { "Would delete" };
    for date in &plan.history_partitions {
        println!("{verb} history partition {date}");
    }
    if !report.applied {
        println!();
        println!("Dry run. Re-run with --force to apply.");
    }
    Ok(())
}
