use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Build tree is missing or the library has not been compiled.
    #[error("environment check failed: {0}")]
    Environment(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to fetch {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("unreadable archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read index {}: {source}", path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Removal of a cached asset failed; only fatal for that matrix's cleanup.
    #[error("cleanup of {} failed: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn network(url: &str, reason: impl ToString) -> Self {
        HarnessError::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
