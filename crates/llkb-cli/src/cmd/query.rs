use crate::cmd::open_store;
use crate::output::{fmt_ratio, print_json, print_table};
use anyhow::Context;
use llkb_core::learning::QueryContext;
use llkb_core::types::EntityKind;
use llkb_core::Llkb;
use std::path::Path;

pub fn run(
    root: &Path,
    text: &str,
    category: Option<String>,
    min_confidence: Option<f64>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(min) = min_confidence {
        if !(0.0..=1.0).contains(&min) {
            anyhow::bail!("--min-confidence must be between 0 and 1, got {min}");
        }
    }

    let store = open_store(root)?;
    let config = store.config();
    let llkb = Llkb::with_store(store, config);

    let ctx = QueryContext {
        category,
        min_confidence,
        ..QueryContext::new(text)
    };
    let mut matches = llkb.query(&ctx).context("failed to query knowledge base")?;
    matches.truncate(limit);

    if json {
        return print_json(&matches);
    }
    if matches.is_empty() {
        println!("No matching lessons or components.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = matches
        .iter()
        .map(|m| {
            vec![
                m.id.clone(),
                match m.kind {
                    EntityKind::Lesson => "lesson".to_string(),
                    EntityKind::Component => "component".to_string(),
                },
                m.title.clone(),
                fmt_ratio(m.confidence),
                fmt_ratio(m.relevance),
            ]
        })
        .collect();
    print_table(&["ID", "KIND", "TITLE", "CONF", "RELEVANCE"], &rows);
    for m in &matches {
        println!();
        println!("{}: {}", m.id, m.suggestion);
    }
    Ok(())
}
