use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlkbError {
    #[error("not initialized: run 'llkb init'")]
    NotInitialized,

    #[error("timed out after {waited_ms}ms waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("corrupt data in {}: {source}", path.display())]
    CorruptData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("failed to write history event to {}: {source}", path.display())]
    HistoryWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lesson not found: {0}")]
    LessonNotFound(String),

    #[error("component not found: {0}")]
    ComponentNotFound(String),

    #[error("invalid entity id '{0}': expected an 'L…' lesson or 'COMP…' component id")]
    InvalidEntityId(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LlkbError>;
