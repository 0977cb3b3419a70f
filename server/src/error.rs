//! Top-level error type for the deploy pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("app definitions: {0}")]
    Definitions(#[from] definitions::DefinitionsError),

    #[error("process {command:?} exited {exit_code}: {output}")]
    ProcessFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("git operation failed: {0}")]
    Git(String),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize app values: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
