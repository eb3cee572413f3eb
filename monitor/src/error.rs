//! Error types for the notetodo monitor.
//!
//! Each concern has its own error enum next to its code; [`MonitorError`]
//! wraps them for the service layer and the binary.

use std::path::PathBuf;

use thiserror::Error;

use crate::inference::InferenceError;
use crate::store::StoreError;
use crate::watcher::WatcherError;

/// Errors that can occur during monitor operations.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Loading or persisting the todo store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The inference provider failed.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// File watching or note scanning failed.
    #[error("file watch error: {0}")]
    Watch(#[from] WatcherError),

    /// A note could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No inference provider was configured.
    #[error("inference is not configured")]
    InferenceUnavailable,
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
