use crate::cmd::open_store;
use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use std::path::Path;

pub fn run(root: &Path, date: Option<&str>, json: bool) -> anyhow::Result<()> {
    let date = match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{d}', expected YYYY-MM-DD"))?,
        None => Utc::now().date_naive(),
    };

    let store = open_store(root)?;
    let scan = store
        .history()
        .scan(date)
        .with_context(|| format!("failed to read history for {date}"))?;
    if scan.malformed > 0 {
        tracing::warn!(%date, malformed = scan.malformed, "skipped malformed history lines");
    }

    if json {
        return print_json(&scan.events);
    }
    if scan.events.is_empty() {
        println!("No events on {date}.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = scan
        .events
        .iter()
        .map(|e| {
            vec![
                e.timestamp.format("%H:%M:%S").to_string(),
                e.kind.as_str().to_string(),
                e.kind.entity_id().unwrap_or("-").to_string(),
                e.tool.clone(),
                e.summary.clone(),
            ]
        })
        .collect();
    print_table(&["TIME", "EVENT", "ENTITY", "TOOL", "SUMMARY"], &rows);
    Ok(())
}
