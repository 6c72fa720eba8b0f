//! Fetch error taxonomy and progress callouts.
//!
//! Every fatal failure of a fetch phase is a [`FetchError`]. Referential gaps
//! (rows naming an unknown ticker) are not errors: they are dropped and logged.

use crate::decode::DecodeError;
use thiserror::Error;
use tracing::info;

/// Structured error types for fetch operations.
///
/// These are designed to be displayable in CLI output.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("schema mismatch for {table}: missing columns {missing:?}")]
    SchemaMismatch { table: String, missing: Vec<String> },

    #[error("{context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: DecodeError,
    },

    #[error("data archive is not available for {table} (status: {status})")]
    ExportNotAvailable { table: String, status: String },

    #[error("archive contains {count} files, expected exactly one")]
    ArchiveEntries { count: usize },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FetchError {
    /// Attach row or page context to a decode failure.
    pub fn decode(context: impl Into<String>, source: DecodeError) -> Self {
        FetchError::Decode {
            context: context.into(),
            source,
        }
    }
}

/// Observer for long-running byte streams (bulk exports).
pub trait ProgressMonitor: Send + Sync {
    /// Called with the cumulative number of bytes read so far.
    fn on_progress(&self, table: &str, bytes_read: u64);
}

/// Progress reporter that logs through `tracing`.
pub struct LogProgress;

impl ProgressMonitor for LogProgress {
    fn on_progress(&self, table: &str, bytes_read: u64) {
        info!(
            table,
            bytes = bytes_read,
            "read {:.1} MiB",
            bytes_read as f64 / (1024.0 * 1024.0)
        );
    }
}
