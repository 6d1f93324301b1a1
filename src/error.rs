//! Error types for each stage of a bus lookup.
//!
//! Reference and fetch failures are fatal to a request and bubble up as
//! [`TrackerError`]. [`ProjectionError`] only ever describes a single feed
//! entity and is swallowed by the pipeline.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// A reference table could not be read or did not have the expected columns.
#[derive(Error, Debug)]
pub enum ReferenceLoadError {
    #[error("failed to open reference table {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed reference table {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// The feed could not be retrieved or did not look like a vehicle position feed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid feed url {0}")]
    InvalidUrl(String),

    #[error("feed returned HTTP {0}")]
    Status(StatusCode),

    #[error("feed body is not a vehicle position document: {0}")]
    Parse(#[source] serde_json::Error),
}

impl FetchError {
    /// `true` for anything that went wrong before a body was received.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FetchError::Transport(_) | FetchError::InvalidUrl(_) | FetchError::Status(_)
        )
    }
}

/// Anything that stops `/api/buses` from producing a result.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Reference(#[from] ReferenceLoadError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    /// `true` when the feed itself could not be reached.
    pub fn is_feed_outage(&self) -> bool {
        matches!(self, TrackerError::Fetch(e) if e.is_transport())
    }
}

/// Why a single feed entity was left out of the result.
#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("entity does not match the vehicle position shape: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("entity is missing `{0}`")]
    MissingField(&'static str),

    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}
