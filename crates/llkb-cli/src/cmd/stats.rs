use crate::cmd::{open_store, CLI_TOOL};
use crate::output::{fmt_ratio, fmt_time, print_json, print_table};
use anyhow::Context;
use llkb_core::analytics::{AnalyticsSnapshot, RankedEntry};
use llkb_core::{Llkb, RunContext};
use std::collections::BTreeMap;
use std::path::Path;

pub fn run(root: &Path, refresh: bool, json: bool) -> anyhow::Result<()> {
    let store = open_store(root)?;
    let cached: AnalyticsSnapshot = store.load().context("failed to load analytics")?;

    let snapshot = if refresh || cached.last_updated.is_none() {
        let config = store.config();
        let mut llkb = Llkb::with_store(store, config);
        llkb.refresh_analytics(&RunContext::new(CLI_TOOL))
            .context("failed to refresh analytics")?
    } else {
        cached
    };

    if json {
        return print_json(&snapshot);
    }

    let o = &snapshot.overview;
    println!("LLKB stats (updated {})", fmt_time(snapshot.last_updated));
    println!();
    println!(
        "  lessons: {}   components: {}   quirks: {}   rules: {}   deferred: {}",
        o.total_lessons, o.total_components, o.total_quirks, o.global_rules, o.deferred_candidates
    );
    println!(
        "  lessons    avg confidence {}  avg success {}  occurrences {}",
        fmt_ratio(snapshot.lessons.avg_confidence),
        fmt_ratio(snapshot.lessons.avg_success_rate),
        snapshot.lessons.total_occurrences
    );
    println!(
        "  components avg confidence {}  avg success {}  uses {}",
        fmt_ratio(snapshot.components.avg_confidence),
        fmt_ratio(snapshot.components.avg_success_rate),
        snapshot.components.total_uses
    );

    print_counts("Lessons by category", &snapshot.lessons.by_category);
    print_counts("Components by category", &snapshot.components.by_category);
    print_ranked("Top lessons", &snapshot.top_lessons);
    print_ranked("Top components", &snapshot.top_components);

    let review = &snapshot.needs_review;
    if !review.is_empty() {
        println!();
        println!("Needs review:");
        for (label, ids) in [
            ("low confidence lessons", &review.low_confidence_lessons),
            ("declining", &review.declining_lessons),
            ("low confidence components", &review.low_confidence_components),
            ("low usage", &review.low_usage_components),
            ("overridden", &review.overridden),
        ] {
            if !ids.is_empty() {
                println!("  {label}: {}", ids.join(", "));
            }
        }
    }
    Ok(())
}

fn print_counts(title: &str, counts: &BTreeMap<String, usize>) {
    if counts.is_empty() {
        return;
    }
    println!();
    println!("{title}:");
    for (key, n) in counts {
        println!("  {key:<12} {n}");
    }
}

fn print_ranked(title: &str, entries: &[RankedEntry]) {
    if entries.is_empty() {
        return;
    }
    println!();
    println!("{title}:");
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| vec![e.id.clone(), e.title.clone(), format!("{:.1}", e.score)])
        .collect();
    print_table(&["ID", "TITLE", "SCORE"], &rows);
}
