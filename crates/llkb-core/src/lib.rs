pub mod analytics;
pub mod confidence;
pub mod config;
pub mod error;
pub mod health;
pub mod history;
pub mod io;
pub mod learning;
pub mod paths;
pub mod rate_limit;
pub mod retention;
pub mod similarity;
pub mod store;
pub mod types;

pub use error::{LlkbError, Result};
pub use learning::Llkb;
pub use rate_limit::RunContext;
pub use store::Store;
