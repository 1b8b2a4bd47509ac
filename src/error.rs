use thiserror::Error;

/// Crate-level error type.
///
/// Component failures during wave execution and merging are captured into
/// structured result values (`TaskResult`, `MergeOutcome`) and never cross
/// component boundaries as errors. `RiptideError` is reserved for programmer
/// and configuration mistakes plus I/O around config and report files.
#[derive(Error, Debug)]
pub enum RiptideError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("Rules error: {0}")]
    Rules(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Memory lookup failed: {0}")]
    Memory(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Context overflow: estimated {estimated} tokens exceeds limit of {max}")]
    ContextOverflow { estimated: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RiptideError>;
