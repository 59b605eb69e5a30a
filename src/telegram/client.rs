//! Media client
//!
//! Ties the session cache to the fetch RPC: every `getFile` call goes
//! through the download limiter, an optional bounded retry, and drops the
//! session from the cache when the datacenter revokes its key.

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::telegram::rate_limit::{ExponentialBackoff, RateLimiter};
use crate::telegram::session::{HomeAuthorization, MediaSession, SessionManager};
use crate::telegram::transport::{ChunkRequest, DcId, FileResponse, MediaTransport, RpcError};
use crate::telegram::MAX_CHUNK_SIZE;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Entry point for talking to datacenters
pub struct MediaClient {
    config: DownloadConfig,
    sessions: SessionManager,
    download_limiter: RateLimiter,
}

impl MediaClient {
    /// Create a client over `transport`, logged into `home`
    pub fn new(
        transport: Arc<dyn MediaTransport>,
        home: HomeAuthorization,
        config: DownloadConfig,
    ) -> Self {
        let sessions = SessionManager::new(transport, home)
            .with_auth_import_attempts(config.auth_import_attempts);
        let download_limiter =
            RateLimiter::new(config.max_concurrent_downloads, config.requests_per_second);

        MediaClient {
            config,
            sessions,
            download_limiter,
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Per-request byte limit, never above the protocol maximum
    pub fn chunk_size_limit(&self) -> u32 {
        self.config.chunk_size_limit.min(MAX_CHUNK_SIZE)
    }

    /// Session for `dc_id`, created on first use
    pub async fn session(&self, dc_id: DcId) -> Result<Arc<MediaSession>> {
        self.sessions.get_or_create_session(dc_id).await
    }

    /// Issue one `getFile` call
    ///
    /// Transport failures surface as [`Error::TransientFetchFailure`] once the
    /// configured retries are spent (none by default).
    pub async fn fetch(&self, session: &MediaSession, request: &ChunkRequest) -> Result<FileResponse> {
        let mut backoff = ExponentialBackoff::new(
            self.config.retry_base_delay_ms,
            self.config.fetch_retry_attempts,
        );

        loop {
            let result = {
                let _permit = self.download_limiter.acquire().await?;
                self.sessions.transport().get_file(session, request).await
            };

            let e = match result {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if e.is_auth_failure() {
                error!("DC {} rejected the session key: {}", session.dc_id(), e);
                self.sessions.invalidate_session(session).await;
                return Err(Error::TransientFetchFailure {
                    offset: request.offset,
                    source: e,
                });
            }

            let delay = match &e {
                RpcError::FloodWait { seconds } => {
                    backoff.next_fixed(Duration::from_secs(u64::from(*seconds)))
                }
                _ => backoff.next_delay(),
            };

            match delay {
                Some(delay) => {
                    warn!(
                        "Fetch at offset {} failed, retrying in {:?}: {}",
                        request.offset, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    debug!("Fetch at offset {} failed: {}", request.offset, e);
                    return Err(Error::TransientFetchFailure {
                        offset: request.offset,
                        source: e,
                    });
                }
            }
        }
    }

    /// Close all sessions
    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
    }
}
