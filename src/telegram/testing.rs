//! Scripted in-memory transport for tests

use crate::telegram::session::{HomeAuthorization, MediaSession};
use crate::telegram::transport::{
    AuthKey, ChunkRequest, DcId, ExportedAuthorization, FileResponse, MediaTransport, RpcError,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub const HOME_DC: DcId = 2;

pub fn home() -> HomeAuthorization {
    HomeAuthorization {
        dc_id: HOME_DC,
        auth_key: AuthKey::new(vec![0xAB; 256]),
        test_mode: false,
    }
}

/// Serves a byte buffer by offset, or replays scripted responses first
#[derive(Default)]
pub struct MockTransport {
    data: Bytes,
    /// Upper bound on bytes per reply (0 = the request limit)
    max_reply: usize,
    script: Mutex<VecDeque<Result<FileResponse, RpcError>>>,
    /// Number of imports that fail with AUTH_BYTES_INVALID before succeeding
    import_failures: AtomicU32,
    handshake_delay: Option<Duration>,

    pub handshakes: AtomicU32,
    pub starts: AtomicU32,
    pub stops: AtomicU32,
    pub exports: AtomicU32,
    pub imports: AtomicU32,
    pub requests: Mutex<Vec<ChunkRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data`, at most `max_reply` bytes per response
    pub fn serving(data: impl Into<Bytes>, max_reply: usize) -> Self {
        MockTransport {
            data: data.into(),
            max_reply,
            ..Self::default()
        }
    }

    /// Replay these responses, in order, before falling back to `data`
    pub fn scripted(responses: Vec<Result<FileResponse, RpcError>>) -> Self {
        MockTransport {
            script: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn with_import_failures(self, failures: u32) -> Self {
        self.import_failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = Some(delay);
        self
    }

    pub fn request_offsets(&self) -> Vec<u64> {
        self.requests.lock().iter().map(|r| r.offset).collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    async fn create_authorization_key(
        &self,
        dc_id: DcId,
        _test_mode: bool,
    ) -> Result<AuthKey, RpcError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.handshake_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(AuthKey::new(vec![dc_id as u8; 256]))
    }

    async fn start_session(&self, _session: &MediaSession) -> Result<(), RpcError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_session(&self, _session: &MediaSession) -> Result<(), RpcError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn export_authorization(&self, dc_id: DcId) -> Result<ExportedAuthorization, RpcError> {
        let n = self.exports.fetch_add(1, Ordering::SeqCst);
        Ok(ExportedAuthorization {
            id: dc_id as i64 * 1000 + n as i64,
            bytes: vec![1, 2, 3, 4],
        })
    }

    async fn import_authorization(
        &self,
        _session: &MediaSession,
        _authorization: &ExportedAuthorization,
    ) -> Result<(), RpcError> {
        self.imports.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .import_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(RpcError::AuthBytesInvalid)
        } else {
            Ok(())
        }
    }

    async fn get_file(
        &self,
        _session: &MediaSession,
        request: &ChunkRequest,
    ) -> Result<FileResponse, RpcError> {
        self.requests.lock().push(request.clone());

        if let Some(scripted) = self.script.lock().pop_front() {
            return scripted;
        }

        let start = (request.offset as usize).min(self.data.len());
        let mut len = request.limit as usize;
        if self.max_reply > 0 {
            len = len.min(self.max_reply);
        }
        let end = (start + len).min(self.data.len());
        Ok(FileResponse::Payload(self.data.slice(start..end)))
    }
}

/// Deterministic test content: byte i is `i % 251`
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
