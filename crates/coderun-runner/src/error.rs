//! Error types for host bridges and module fetching.
//!
//! Neither of these ever escapes a run as a Rust error: inside a script they
//! become the thrown message.

use camino::Utf8PathBuf;

/// Errors raised by a [`HostBridge`](crate::HostBridge).
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The workbook has no table to act on.
    #[error("no active table")]
    NoActiveTable,

    /// A table id that the workbook does not know.
    #[error("table not found: {0}")]
    UnknownTable(String),

    /// A record was given a field the table does not have.
    #[error("field {field} not found in table {table}")]
    UnknownField { table: String, field: String },

    /// The fixture workbook could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The fixture workbook is not valid YAML for a workbook.
    #[error("invalid fixture workbook {path}: {source}")]
    Fixture {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors raised while fetching module source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("failed to fetch module {url}: status {status}")]
    Status { url: String, status: u16 },

    /// No source is known for this URL.
    #[error("failed to fetch module {0}: not found")]
    NotFound(String),

    /// Transport-level failure.
    #[error("failed to fetch module: {0}")]
    Request(#[from] reqwest::Error),
}
