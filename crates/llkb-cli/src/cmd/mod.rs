pub mod config;
pub mod health;
pub mod history;
pub mod init;
pub mod prune;
pub mod query;
pub mod record;
pub mod stats;

use llkb_core::{LlkbError, Store};
use std::path::Path;

/// Open the store, refusing to run against a root that was never initialized.
pub fn open_store(root: &Path) -> anyhow::Result<Store> {
    let store = Store::open(root);
    if !store.is_initialized() {
        return Err(anyhow::Error::new(LlkbError::NotInitialized)
            .context(format!("no LLKB at {}", root.display())));
    }
    Ok(store)
}

/// Tool name stamped on history events written by the CLI.
pub const CLI_TOOL: &str = "llkb-cli";
