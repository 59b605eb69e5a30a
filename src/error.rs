//! Error types for tgfetch

use crate::telegram::RpcError;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving, connecting to and streaming media
#[derive(Error, Debug)]
pub enum Error {
    #[error("This message doesn't contain any downloadable media")]
    NoDownloadableMedia,

    #[error("Invalid file id: {0}")]
    InvalidFileId(String),

    #[error("Authorization import into DC {dc_id} failed after {attempts} attempts")]
    AuthExchangeFailed { dc_id: i32, attempts: u32 },

    #[error("Fetch at offset {offset} failed: {source}")]
    TransientFetchFailure {
        offset: u64,
        #[source]
        source: RpcError,
    },

    #[error("Retrieval produced no data")]
    EmptyRetrieval,

    #[error("Incomplete retrieval: {written} of {declared} bytes received")]
    IncompleteRetrieval { written: u64, declared: u64 },

    #[error("Invalid byte range {from}-{until} for a file of {size} bytes")]
    InvalidRange { from: u64, until: u64, size: u64 },

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the retrieval that raised this error left a partial result behind
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            Error::IncompleteRetrieval { .. } | Error::TransientFetchFailure { .. }
        )
    }
}
