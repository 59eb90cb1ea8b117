use crate::output::{print_json, print_table};
use llkb_core::health::{self, CheckStatus};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let report = health::check(root);

    if json {
        print_json(&report)?;
    } else {
        let rows: Vec<Vec<String>> = report
            .checks
            .iter()
            .map(|c| {
                vec![
                    c.status.as_str().to_string(),
                    c.name.clone(),
                    c.detail.clone(),
                ]
            })
            .collect();
        print_table(&["STATUS", "CHECK", "DETAIL"], &rows);
    }

    if !report.is_healthy() {
        let failed: Vec<&str> = report
            .checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .map(|c| c.name.as_str())
            .collect();
        anyhow::bail!("health check failed: {}", failed.join(", "));
    }
    Ok(())
}
