//! Error types for scanning operations.

use std::path::PathBuf;

use continuously_core::WatchError;
use thiserror::Error;

/// Errors that abort the initial scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A version control query failed.
    #[cfg(feature = "git")]
    #[error("{operation}: {source}")]
    Git {
        operation: String,
        #[source]
        source: git2::Error,
    },

    /// The repository has no working directory to walk.
    #[error("repository has no working directory: {path}")]
    BareRepository { path: PathBuf },

    /// A directory entry could not be read or its type determined.
    #[error("walking {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A walked path is not below the working directory.
    #[error("path escapes the working directory: {path}")]
    OutsideWorkdir { path: PathBuf },

    /// Installing a watch failed.
    #[error(transparent)]
    Watch(#[from] WatchError),
}

impl ScanError {
    /// Wrap a git error with the name of the failed query.
    #[cfg(feature = "git")]
    pub fn git(operation: impl Into<String>, source: git2::Error) -> Self {
        Self::Git {
            operation: operation.into(),
            source,
        }
    }

    /// Wrap a walker error, keeping the entry path when known.
    pub fn walk(source: walkdir::Error) -> Self {
        let path = source.path().map(|p| p.to_path_buf()).unwrap_or_default();
        Self::Walk { path, source }
    }
}
