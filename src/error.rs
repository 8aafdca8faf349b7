//! Typed errors for the streamer's public boundary.
//!
//! Per the propagation policy in the specification: no error ever crosses a
//! worker/render thread boundary. A failed decode becomes an empty mip list
//! on the result queue (see [`crate::worker_pool`]); `StreamerError` is only
//! returned by APIs called directly on the render thread (`add`, `remove`,
//! config loading).

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the [`crate::cache::CacheDirectory`] and
/// [`crate::streamer::StreamerController`] APIs.
#[derive(Debug, Error)]
pub enum StreamerError {
    /// `add` was called twice for the same filepath. Programmer error.
    #[error("texture already present for {0:?}")]
    AlreadyPresent(PathBuf),

    /// A freshly generated pyramid disagreed in size with the descriptor
    /// captured when the texture was added. Recoverable: the descriptor is
    /// refreshed from the new pyramid and reconciliation retried.
    #[error("mip size mismatch for {path:?} at level {level}: descriptor said {expected:?}, decoded pyramid has {actual:?}")]
    SizeMismatch {
        path: PathBuf,
        level: usize,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The configuration file could not be parsed; defaults were used for
    /// the affected fields.
    #[error("failed to load configuration from {path:?}: {source}")]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors from the `Decoder` boundary (see [`crate::decoder`]).
///
/// These never escape a worker thread as `Result::Err` — `process_job`
/// catches them and reports an empty mip list instead. The enum exists so
/// decoder implementations have something concrete to return and so unit
/// tests can assert on *why* a job failed before it's swallowed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0:?} is not a recognized image")]
    NotAnImage(PathBuf),

    #[error("failed to decode {path:?}: {source}")]
    DecodeFailed {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to read header of {path:?}: {source}")]
    HeaderReadFailed {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
