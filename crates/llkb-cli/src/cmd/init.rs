use crate::output::print_json;
use anyhow::Context;
use llkb_core::Store;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let store = Store::open(root);
    let created = store
        .init()
        .with_context(|| format!("failed to initialize {}", root.display()))?;

    if json {
        return print_json(&serde_json::json!({
            "root": root,
            "created": created,
        }));
    }

    println!("Initializing LLKB in: {}", root.display());
    if created.is_empty() {
        println!("  already initialized, nothing to create");
    }
    for file in &created {
        println!("  created: {file}");
    }
    Ok(())
}
