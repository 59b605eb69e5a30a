//! RPC surface consumed by the download engine
//!
//! The MTProto connection itself (handshake, encryption, serialization)
//! lives behind [`MediaTransport`]. Request and response shapes here mirror
//! the backend's `auth.exportAuthorization`, `auth.importAuthorization` and
//! `upload.getFile` calls.

use crate::media::Location;
use crate::telegram::session::MediaSession;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// Datacenter identifier
pub type DcId = i32;

/// Authorization key for one datacenter (zeroized on drop)
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey(Zeroizing<Vec<u8>>);

impl AuthKey {
    pub fn new(key: Vec<u8>) -> Self {
        AuthKey(Zeroizing::new(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthKey({} bytes)", self.0.len())
    }
}

/// Token returned by `auth.exportAuthorization`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedAuthorization {
    pub id: i64,
    pub bytes: Vec<u8>,
}

/// One `upload.getFile` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub location: Location,
    pub offset: u64,
    /// Never above [`crate::telegram::MAX_CHUNK_SIZE`]
    pub limit: u32,
}

/// Result of `upload.getFile`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileResponse {
    /// File bytes; shorter than the limit near the end, empty past it
    Payload(Bytes),
    /// Any other constructor (e.g. a CDN redirect); not usable here
    Other(String),
}

/// Errors reported by the transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("AUTH_BYTES_INVALID")]
    AuthBytesInvalid,

    #[error("AUTH_KEY_UNREGISTERED")]
    AuthKeyUnregistered,

    #[error("FLOOD_WAIT_{seconds}")]
    FloodWait { seconds: u32 },

    #[error("RPC error {code}: {name}")]
    Rpc { code: i32, name: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl RpcError {
    /// The session can no longer be used and must be dropped from the cache
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, RpcError::AuthKeyUnregistered | RpcError::Rpc { code: 401, .. })
    }
}

/// Connection-level operations the engine relies on
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Run a full auth key handshake against `dc_id`
    async fn create_authorization_key(
        &self,
        dc_id: DcId,
        test_mode: bool,
    ) -> Result<AuthKey, RpcError>;

    /// Open the connection backing a session
    async fn start_session(&self, session: &MediaSession) -> Result<(), RpcError>;

    /// Close the connection backing a session
    async fn stop_session(&self, session: &MediaSession) -> Result<(), RpcError>;

    /// `auth.exportAuthorization`, invoked on the home session
    async fn export_authorization(&self, dc_id: DcId) -> Result<ExportedAuthorization, RpcError>;

    /// `auth.importAuthorization`, invoked on `session`
    async fn import_authorization(
        &self,
        session: &MediaSession,
        authorization: &ExportedAuthorization,
    ) -> Result<(), RpcError>;

    /// `upload.getFile`, invoked on `session`
    async fn get_file(
        &self,
        session: &MediaSession,
        request: &ChunkRequest,
    ) -> Result<FileResponse, RpcError>;
}
