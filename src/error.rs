use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Failures that abort a run.
///
/// Annotation and type-resolution problems are never errors; they degrade to
/// placeholders and warnings. Only the source loader, configuration and
/// output writing can fail.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_message_names_the_file() {
        let err = Error::load("api/handler.go", "unbalanced braces in type Widget");
        assert_eq!(
            err.to_string(),
            "Failed to load api/handler.go: unbalanced braces in type Widget"
        );
    }
}
