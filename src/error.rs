use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CourseError>;

/// Failures that reach the caller. Heuristic ambiguity inside the pipeline is
/// resolved by fallback rules and never shows up here.
#[derive(Debug, Error)]
pub enum CourseError {
    /// A source or course file could not be read. Fatal for the run.
    #[error("cannot read {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid page limits: {message}")]
    Limits { message: String },

    #[error("invalid title pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("malformed course JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CourseError {
    pub fn input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Input {
            path: path.into(),
            source,
        }
    }

    pub fn limits(message: impl Into<String>) -> Self {
        Self::Limits {
            message: message.into(),
        }
    }
}

/// Read a whole UTF-8 file, naming the file on failure.
pub fn read_source(path: &std::path::Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| CourseError::input(path, e))
}
