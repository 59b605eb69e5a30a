//! Telegram backend module
//!
//! Handles everything that talks to datacenters:
//! - Per-datacenter session creation and authorization import
//! - The `getFile` RPC, with pacing and optional retry
//! - The transport trait the connection layer implements

mod client;
mod rate_limit;
mod session;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::MediaClient;
pub use rate_limit::{ExponentialBackoff, RateLimitGuard, RateLimiter};
pub use session::{HomeAuthorization, MediaSession, SessionManager, DEFAULT_AUTH_IMPORT_ATTEMPTS};
pub use transport::{
    AuthKey, ChunkRequest, DcId, ExportedAuthorization, FileResponse, MediaTransport, RpcError,
};

/// Largest byte limit `upload.getFile` accepts
pub const MAX_CHUNK_SIZE: u32 = 512 * 1024;
