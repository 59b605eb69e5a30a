//! Per-datacenter media sessions
//!
//! Files live on the datacenter that stores them, which is not necessarily
//! the one the client logged into. A session for a foreign datacenter needs
//! its own auth key plus an authorization exported from the home session.
//! Sessions are cached for the life of the process; each datacenter is
//! initialized at most once even under concurrent first use.

use crate::error::{Error, Result};
use crate::telegram::transport::{AuthKey, DcId, MediaTransport, RpcError};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Default number of export/import rounds before giving up
pub const DEFAULT_AUTH_IMPORT_ATTEMPTS: u32 = 3;

/// Authenticated channel to one datacenter
#[derive(Debug)]
pub struct MediaSession {
    dc_id: DcId,
    auth_key: AuthKey,
    test_mode: bool,
    is_media: bool,
}

impl MediaSession {
    /// Create a media-transfer session
    pub fn new(dc_id: DcId, auth_key: AuthKey, test_mode: bool) -> Self {
        MediaSession {
            dc_id,
            auth_key,
            test_mode,
            is_media: true,
        }
    }

    pub fn dc_id(&self) -> DcId {
        self.dc_id
    }

    pub fn auth_key(&self) -> &AuthKey {
        &self.auth_key
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn is_media(&self) -> bool {
        self.is_media
    }
}

/// The datacenter the client is logged into, with its key
#[derive(Debug, Clone)]
pub struct HomeAuthorization {
    pub dc_id: DcId,
    pub auth_key: AuthKey,
    pub test_mode: bool,
}

type SessionCell = Arc<OnceCell<Arc<MediaSession>>>;

/// Process-wide cache of media sessions keyed by datacenter
pub struct SessionManager {
    transport: Arc<dyn MediaTransport>,
    home: HomeAuthorization,
    auth_import_attempts: u32,
    sessions: DashMap<DcId, SessionCell>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn MediaTransport>, home: HomeAuthorization) -> Self {
        SessionManager {
            transport,
            home,
            auth_import_attempts: DEFAULT_AUTH_IMPORT_ATTEMPTS,
            sessions: DashMap::new(),
        }
    }

    /// Override how many export/import rounds are tried (minimum 1)
    pub fn with_auth_import_attempts(mut self, attempts: u32) -> Self {
        self.auth_import_attempts = attempts.max(1);
        self
    }

    pub fn home_dc_id(&self) -> DcId {
        self.home.dc_id
    }

    pub fn transport(&self) -> &Arc<dyn MediaTransport> {
        &self.transport
    }

    /// Cached session for `dc_id`, without creating one
    pub fn cached(&self, dc_id: DcId) -> Option<Arc<MediaSession>> {
        self.sessions
            .get(&dc_id)
            .and_then(|entry| entry.value().get().cloned())
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the session for `dc_id`, creating and caching it on first use
    pub async fn get_or_create_session(&self, dc_id: DcId) -> Result<Arc<MediaSession>> {
        if let Some(session) = self.cached(dc_id) {
            return Ok(session);
        }

        // A cell stays mapped until it holds a session; a failed init leaves
        // it empty for the next caller to retry in place.
        let cell = self.sessions.entry(dc_id).or_default().value().clone();
        cell.get_or_try_init(|| self.create_session(dc_id))
            .await
            .map(Arc::clone)
    }

    async fn create_session(&self, dc_id: DcId) -> Result<Arc<MediaSession>> {
        if dc_id == self.home.dc_id {
            debug!("Reusing home authorization for DC {}", dc_id);
            let session = MediaSession::new(dc_id, self.home.auth_key.clone(), self.home.test_mode);
            self.transport.start_session(&session).await?;
            return Ok(Arc::new(session));
        }

        info!("Creating media session for DC {}", dc_id);
        let auth_key = self
            .transport
            .create_authorization_key(dc_id, self.home.test_mode)
            .await?;
        let session = MediaSession::new(dc_id, auth_key, self.home.test_mode);
        self.transport.start_session(&session).await?;

        if let Err(e) = self.import_authorization(&session).await {
            self.stop(&session).await;
            return Err(e);
        }

        info!("Media session for DC {} ready", dc_id);
        Ok(Arc::new(session))
    }

    /// Export from home, import into `session`; retried on AUTH_BYTES_INVALID only
    async fn import_authorization(&self, session: &MediaSession) -> Result<()> {
        let dc_id = session.dc_id();

        for attempt in 1..=self.auth_import_attempts {
            let exported = self.transport.export_authorization(dc_id).await?;
            match self.transport.import_authorization(session, &exported).await {
                Ok(()) => {
                    debug!("Imported authorization into DC {} (attempt {})", dc_id, attempt);
                    return Ok(());
                }
                Err(RpcError::AuthBytesInvalid) => {
                    warn!(
                        "Authorization bytes rejected by DC {} (attempt {}/{})",
                        dc_id, attempt, self.auth_import_attempts
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        error!("Giving up on authorization import into DC {}", dc_id);
        Err(Error::AuthExchangeFailed {
            dc_id,
            attempts: self.auth_import_attempts,
        })
    }

    /// Drop the session for `dc_id` (e.g. after its key was revoked)
    ///
    /// A session still being created is left alone.
    pub async fn invalidate(&self, dc_id: DcId) {
        if let Some(session) = self.remove_initialized(dc_id, |_| true) {
            warn!("Invalidating media session for DC {}", dc_id);
            self.stop(&session).await;
        }
    }

    /// Drop `session` from the cache if it is still the one cached for its DC
    pub async fn invalidate_session(&self, session: &MediaSession) {
        let dc_id = session.dc_id();
        let removed = self.remove_initialized(dc_id, |cached| std::ptr::eq(cached, session));
        if let Some(session) = removed {
            warn!("Invalidating media session for DC {}", dc_id);
            self.stop(&session).await;
        }
    }

    /// Stop every cached session
    pub async fn shutdown(&self) {
        let dcs: Vec<DcId> = self.sessions.iter().map(|e| *e.key()).collect();
        for dc_id in dcs {
            if let Some(session) = self.remove_initialized(dc_id, |_| true) {
                self.stop(&session).await;
            }
        }
        info!("Media sessions closed");
    }

    fn remove_initialized<F>(&self, dc_id: DcId, matches: F) -> Option<Arc<MediaSession>>
    where
        F: Fn(&MediaSession) -> bool,
    {
        self.sessions
            .remove_if(&dc_id, |_, cell| {
                cell.get().map_or(false, |session| matches(session))
            })
            .and_then(|(_, cell)| cell.get().cloned())
    }

    async fn stop(&self, session: &MediaSession) {
        if let Err(e) = self.transport.stop_session(session).await {
            warn!("Failed to stop session for DC {}: {}", session.dc_id(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::testing::{home, MockTransport, HOME_DC};
    use std::time::Duration;

    fn manager(transport: &Arc<MockTransport>) -> SessionManager {
        SessionManager::new(transport.clone(), home())
    }

    #[tokio::test]
    async fn test_home_dc_uses_home_key() {
        let transport = Arc::new(MockTransport::new());
        let sessions = manager(&transport);

        let session = sessions.get_or_create_session(HOME_DC).await.unwrap();

        assert_eq!(session.dc_id(), HOME_DC);
        assert_eq!(session.auth_key(), &home().auth_key);
        assert!(session.is_media());
        assert_eq!(MockTransport::count(&transport.handshakes), 0);
        assert_eq!(MockTransport::count(&transport.exports), 0);
        assert_eq!(MockTransport::count(&transport.starts), 1);
    }

    #[tokio::test]
    async fn test_foreign_dc_imports_authorization() {
        let transport = Arc::new(MockTransport::new());
        let sessions = manager(&transport);

        let session = sessions.get_or_create_session(4).await.unwrap();

        assert_eq!(session.dc_id(), 4);
        assert_eq!(session.auth_key().as_bytes(), &[4u8; 256][..]);
        assert_eq!(MockTransport::count(&transport.handshakes), 1);
        assert_eq!(MockTransport::count(&transport.exports), 1);
        assert_eq!(MockTransport::count(&transport.imports), 1);
    }

    #[tokio::test]
    async fn test_session_reused() {
        let transport = Arc::new(MockTransport::new());
        let sessions = manager(&transport);

        let first = sessions.get_or_create_session(5).await.unwrap();
        let second = sessions.get_or_create_session(5).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(MockTransport::count(&transport.handshakes), 1);
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_import_retried_then_succeeds() {
        let transport = Arc::new(MockTransport::new().with_import_failures(2));
        let sessions = manager(&transport);

        sessions.get_or_create_session(3).await.unwrap();

        assert_eq!(MockTransport::count(&transport.imports), 3);
        assert_eq!(MockTransport::count(&transport.exports), 3);
        assert!(sessions.cached(3).is_some());
    }

    #[tokio::test]
    async fn test_import_gives_up_after_three_attempts() {
        let transport = Arc::new(MockTransport::new().with_import_failures(u32::MAX));
        let sessions = manager(&transport);

        let result = sessions.get_or_create_session(3).await;

        assert!(matches!(
            result,
            Err(Error::AuthExchangeFailed { dc_id: 3, attempts: 3 })
        ));
        assert_eq!(MockTransport::count(&transport.imports), 3);
        assert_eq!(MockTransport::count(&transport.stops), 1);
        assert!(sessions.cached(3).is_none());
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_first_use_single_handshake() {
        let transport = Arc::new(
            MockTransport::new().with_handshake_delay(Duration::from_millis(20)),
        );
        let sessions = Arc::new(manager(&transport));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.get_or_create_session(4).await })
            })
            .collect();

        let mut resolved = Vec::new();
        for task in tasks {
            resolved.push(task.await.unwrap().unwrap());
        }

        assert_eq!(MockTransport::count(&transport.handshakes), 1);
        assert!(resolved.iter().all(|s| Arc::ptr_eq(s, &resolved[0])));
    }

    #[tokio::test]
    async fn test_invalidate_and_shutdown() {
        let transport = Arc::new(MockTransport::new());
        let sessions = manager(&transport);

        sessions.get_or_create_session(HOME_DC).await.unwrap();
        sessions.get_or_create_session(1).await.unwrap();
        sessions.get_or_create_session(4).await.unwrap();

        sessions.invalidate(1).await;
        assert!(sessions.cached(1).is_none());
        assert_eq!(MockTransport::count(&transport.stops), 1);

        sessions.shutdown().await;
        assert!(sessions.is_empty());
        assert_eq!(MockTransport::count(&transport.stops), 3);
    }

    #[tokio::test]
    async fn test_failed_init_retried_in_cached_cell() {
        let transport = Arc::new(
            MockTransport::new()
                .with_import_failures(1)
                .with_handshake_delay(Duration::from_millis(10)),
        );
        let sessions = Arc::new(manager(&transport).with_auth_import_attempts(1));

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.get_or_create_session(4).await })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }

        let failures = results.iter().filter(|r| r.is_err()).count();
        let created: Vec<_> = results.into_iter().filter_map(|r| r.ok()).collect();
        assert_eq!(failures, 1);
        assert_eq!(created.len(), 1);

        let cached = sessions.cached(4).unwrap();
        assert!(Arc::ptr_eq(&cached, &created[0]));

        let again = sessions.get_or_create_session(4).await.unwrap();
        assert!(Arc::ptr_eq(&again, &created[0]));
        assert_eq!(MockTransport::count(&transport.handshakes), 2);

        sessions.shutdown().await;
        assert_eq!(
            MockTransport::count(&transport.stops),
            MockTransport::count(&transport.starts)
        );
    }

    #[tokio::test]
    async fn test_stale_invalidation_keeps_newer_session() {
        let transport = Arc::new(MockTransport::new());
        let sessions = manager(&transport);

        let stale = sessions.get_or_create_session(4).await.unwrap();
        sessions.invalidate_session(&stale).await;
        assert!(sessions.cached(4).is_none());

        let fresh = sessions.get_or_create_session(4).await.unwrap();
        sessions.invalidate_session(&stale).await;

        let cached = sessions.cached(4).unwrap();
        assert!(Arc::ptr_eq(&cached, &fresh));
        assert_eq!(MockTransport::count(&transport.stops), 1);
    }
}
