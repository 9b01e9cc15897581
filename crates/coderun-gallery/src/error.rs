//! Error types for the template gallery and snapshot storage.

use camino::Utf8PathBuf;

/// Errors raised by snapshot stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error while reading or writing the store file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store file exists but is not a JSON object of strings.
    #[error("corrupt snapshot store {path}: {source}")]
    Corrupt {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The store could not be serialized.
    #[error("failed to encode snapshot store: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors raised by gallery operations.
#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    /// A template index outside the gallery was requested.
    #[error("template index {index} out of range (gallery has {len} templates)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = GalleryError> = std::result::Result<T, E>;
