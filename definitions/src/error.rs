//! Error types for loading and canonicalizing app definitions.

use thiserror::Error;

/// Errors that can occur while loading an [`crate::app::App`] or an
/// [`crate::app::AppDefinitions`] snapshot from disk.
#[derive(Debug, Error)]
pub enum DefinitionsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML at {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("`extends` cycle detected while resolving {path}")]
    ExtendsCycle { path: String },

    #[error("app {name:?} is missing required field {field:?}")]
    MissingField { name: String, field: &'static str },

    #[error("app {name:?} has an unsupported chart type {kind:?} (expected git, helm or local)")]
    UnsupportedChartType { name: String, kind: String },

    #[error("app {name:?} has a chart field that is neither a string nor a mapping")]
    InvalidChart { name: String },
}

pub type Result<T> = std::result::Result<T, DefinitionsError>;
