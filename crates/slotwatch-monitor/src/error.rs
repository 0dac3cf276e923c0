use std::path::PathBuf;

use thiserror::Error;

/// Errors from reading or writing the state file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not a valid state document.
    #[error("state file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Another process holds the single-writer lock.
    #[error("state lock {} is held by another run", path.display())]
    LockHeld { path: PathBuf },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The receiver answered with a non-success status.
    #[error("notification rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}
