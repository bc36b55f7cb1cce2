//! Harness errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("line {line}: handle #{index} has not been produced yet")]
    UnknownHandle { line: usize, index: usize },
    #[error("unknown fit selection `{0}` (expected first, best or both)")]
    UnknownFit(String),
    #[error("{failed} of {total} scenarios failed")]
    ScenarioFailures { failed: usize, total: usize },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
