//! Error types for the interposition layer
//!
//! Registration and open-time loading failures are errors. Operations on a
//! stream or directory handle without a backing resource are not: they
//! degrade to neutral values inside the facades.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by registration, open and configuration
#[derive(Debug, Error)]
pub enum Error {
    #[error("file to intercept does not exist: {}", .0.display())]
    InvalidTarget(PathBuf),

    #[error("replacement file does not exist: {}", .0.display())]
    InvalidReplacement(PathBuf),

    #[error("replacement `{}` could not be loaded: {source}", path.display())]
    ReplacementUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("source `{}` could not be loaded: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open `{}`: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("stat failed for `{}`: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The underlying I/O error, if this error wraps one
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Error::ReplacementUnreadable { source, .. }
            | Error::SourceUnreadable { source, .. }
            | Error::OpenFailed { source, .. }
            | Error::Stat { source, .. } => Some(source),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::ReplacementUnreadable { source, .. }
            | Error::SourceUnreadable { source, .. }
            | Error::OpenFailed { source, .. }
            | Error::Stat { source, .. }
            | Error::Io(source) => source,
            Error::InvalidTarget(_) | Error::InvalidReplacement(_) => {
                io::Error::new(io::ErrorKind::NotFound, err)
            }
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
