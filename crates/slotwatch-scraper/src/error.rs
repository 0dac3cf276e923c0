use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {url} (retry after {retry_after_secs}s)")]
    RateLimited { url: String, retry_after_secs: u64 },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        /// Response body, kept so a failed navigation can still be snapshotted.
        body: String,
    },

    #[error("invalid booking URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("slot export {} is not valid JSON: {source}", path.display())]
    ExportParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no slots export found in {}", dir.display())]
    NoExport { dir: PathBuf },
}

impl ScraperError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A single row could not be read. The row is skipped; the batch continues.
#[derive(Debug, Error)]
#[error("could not read {what} from row: {reason}")]
pub struct ExtractionError {
    pub what: &'static str,
    pub reason: String,
}
