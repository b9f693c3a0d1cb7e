//! The instance registry: process-wide list of live managed sessions.
//!
//! All insertions, removals, and full-list reads serialize through one
//! `RwLock`; teardown triggers (explicit kills, process exits, keepalive
//! expiry) may race freely because the per-instance open flag admits exactly
//! one teardown.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    corral_service_traits::LifecycleHooks,
    tokio::sync::RwLock,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    error::SessionError,
    instance::{BrowserSession, KeepaliveGuard},
    proxy,
    types::{SessionConfig, SessionDescriptor},
};

pub(crate) struct RegistryInner {
    pub config: SessionConfig,
    pub hooks: Arc<dyn LifecycleHooks>,
    pub http: reqwest::Client,
    pub sessions: RwLock<HashMap<String, Arc<BrowserSession>>>,
}

impl RegistryInner {
    /// Tear down a session by id. `None` when no live session has that id.
    pub(crate) async fn close_by_id(&self, id: &str) -> Option<()> {
        let session = { self.sessions.read().await.get(id).cloned() }?;
        self.close(&session).await;
        Some(())
    }

    /// Idempotent teardown. Exactly one caller performs the cleanup; later
    /// callers observe the closed flag and return immediately. Individual
    /// step failures are logged and never abort the remaining steps.
    pub(crate) async fn close(&self, session: &Arc<BrowserSession>) {
        if !session.mark_closed() {
            return;
        }
        let guards = session.take_guards();

        // Detaching the exit watcher is the first visible effect; it kills
        // and reaps the owned process instead of re-entering teardown.
        if let Some(exit) = &guards.exit {
            exit.token.cancel();
        }
        if let Some(keepalive) = &guards.keepalive {
            keepalive.token.cancel();
        }
        if let Some(dir) = guards.temp_data_dir {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(
                    session_id = %session.id,
                    path = %path.display(),
                    error = %e,
                    "could not remove session data dir"
                );
            }
        }
        {
            self.sessions.write().await.remove(&session.id);
        }
        if let Some(monitor) = guards.monitor {
            monitor.abort();
        }
        if let Some(handler) = guards.handler {
            handler.abort();
        }
        // Drop the control connection without a protocol-level close; a hard
        // close can surface unhandled protocol-stream errors in some builds.
        drop(guards.browser);

        info!(session_id = %session.id, "session closed");
    }
}

/// Arm the keepalive deadline for a session. On expiry the session is torn
/// down unconditionally; cancellation (activity or teardown) discards it.
pub(crate) fn arm_keepalive(
    inner: &Arc<RegistryInner>,
    session: &Arc<BrowserSession>,
    deadline_ms: u64,
) {
    let token = CancellationToken::new();
    let expire = token.clone();
    let weak = Arc::downgrade(inner);
    let id = session.id.clone();
    let task = tokio::spawn(async move {
        tokio::select! {
            () = expire.cancelled() => {},
            () = tokio::time::sleep(Duration::from_millis(deadline_ms)) => {
                debug!(session_id = %id, "keepalive deadline expired");
                if let Some(inner) = weak.upgrade() {
                    inner.close_by_id(&id).await;
                }
            },
        }
    });
    session.install(|guards| guards.keepalive = Some(KeepaliveGuard { token, task }));
}

/// Shared handle to the registry.
#[derive(Clone)]
pub struct SessionRegistry {
    pub(crate) inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig, hooks: Arc<dyn LifecycleHooks>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                hooks,
                http: reqwest::Client::new(),
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub(crate) async fn insert(&self, session: Arc<BrowserSession>) {
        self.inner
            .sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    /// Number of live instances.
    pub async fn count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn find_by_id(&self, id: &str) -> Option<Arc<BrowserSession>> {
        self.inner.sessions.read().await.get(id).cloned()
    }

    /// Find the session whose control endpoint contains the path fragment.
    pub async fn find_by_control_path(&self, fragment: &str) -> Option<Arc<BrowserSession>> {
        self.inner
            .sessions
            .read()
            .await
            .values()
            .find(|session| session.ws_endpoint.contains(fragment))
            .cloned()
    }

    /// Find the first advertised page whose devtools-frontend or WebSocket
    /// URL contains the path fragment. Read-through: every call fetches each
    /// instance's current targets.
    pub async fn find_by_page_path(
        &self,
        fragment: &str,
    ) -> Result<Option<SessionDescriptor>, SessionError> {
        for session in self.snapshot().await {
            match proxy::instance_targets(&self.inner.http, &self.inner.config, &session).await {
                Ok(targets) => {
                    let found = targets.into_iter().find(|target| {
                        target
                            .devtools_frontend_url
                            .as_deref()
                            .is_some_and(|u| u.contains(fragment))
                            || target
                                .web_socket_debugger_url
                                .as_deref()
                                .is_some_and(|u| u.contains(fragment))
                    });
                    if let Some(found) = found {
                        return Ok(Some(found));
                    }
                },
                Err(e @ SessionError::MissingDebugPort(_)) => return Err(e),
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "skipping session in page lookup");
                },
            }
        }
        Ok(None)
    }

    /// Aggregate rewritten debugging sessions across all live instances.
    ///
    /// Recomputed on every call. A failed fetch for one instance is logged
    /// and skipped so a single broken instance cannot blind callers to the
    /// others; a missing debug port fails the whole call.
    pub async fn list_sessions(&self) -> Result<Vec<SessionDescriptor>, SessionError> {
        let snapshot = self.snapshot().await;
        let fetches = snapshot
            .iter()
            .map(|session| proxy::instance_targets(&self.inner.http, &self.inner.config, session));
        let results = futures::future::join_all(fetches).await;

        let mut sessions = Vec::new();
        for (session, result) in snapshot.iter().zip(results) {
            match result {
                Ok(mut targets) => sessions.append(&mut targets),
                Err(e @ SessionError::MissingDebugPort(_)) => return Err(e),
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "skipping session in listing");
                },
            }
        }
        Ok(sessions)
    }

    /// Tear down the session with the given id. `None` for unknown ids.
    pub async fn close_session(&self, id: &str) -> Option<()> {
        self.inner.close_by_id(id).await
    }

    /// Tear down the session registered under the given control endpoint.
    pub async fn close_by_endpoint(&self, ws_endpoint: &str) -> Option<()> {
        let session = self
            .inner
            .sessions
            .read()
            .await
            .values()
            .find(|session| session.ws_endpoint == ws_endpoint)
            .cloned()?;
        self.inner.close(&session).await;
        Some(())
    }

    /// Tear down every live session.
    pub async fn close_all(&self) {
        for session in self.snapshot().await {
            self.inner.close(&session).await;
        }
    }

    /// Cancel a session's pending keepalive deadline (new activity).
    pub async fn touch(&self, id: &str) -> Option<()> {
        let session = self.find_by_id(id).await?;
        if let Some(keepalive) = session.take_keepalive() {
            keepalive.token.cancel();
            debug!(session_id = %id, "keepalive cancelled");
        }
        Some(())
    }

    pub(crate) async fn snapshot(&self) -> Vec<Arc<BrowserSession>> {
        self.inner.sessions.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use corral_service_traits::NoopLifecycleHooks;

    use super::*;
    use crate::{
        instance::SessionGuards,
        types::{EngineVariant, SessionFlags},
    };

    fn registry(config: SessionConfig) -> SessionRegistry {
        SessionRegistry::new(config, Arc::new(NoopLifecycleHooks))
    }

    fn session(id: &str, port: Option<u16>, guards: SessionGuards) -> Arc<BrowserSession> {
        Arc::new(BrowserSession::new(
            id.to_string(),
            format!("ws://127.0.0.1:9222/devtools/browser/{id}"),
            port,
            None,
            EngineVariant::Chromium,
            SessionFlags::default(),
            None,
            guards,
        ))
    }

    #[tokio::test]
    async fn insert_count_and_find() {
        let registry = registry(SessionConfig::default());
        assert_eq!(registry.count().await, 0);

        registry
            .insert(session("one", Some(9222), SessionGuards::default()))
            .await;
        registry
            .insert(session("two", Some(9223), SessionGuards::default()))
            .await;

        assert_eq!(registry.count().await, 2);
        assert!(registry.find_by_id("one").await.is_some());
        assert!(registry.find_by_id("three").await.is_none());
        assert!(registry.find_by_control_path("browser/two").await.is_some());
        assert!(registry.find_by_control_path("browser/nope").await.is_none());
    }

    #[tokio::test]
    async fn close_removes_exactly_that_session() {
        let registry = registry(SessionConfig::default());
        registry
            .insert(session("keep", Some(9222), SessionGuards::default()))
            .await;
        registry
            .insert(session("kill", Some(9223), SessionGuards::default()))
            .await;

        assert_eq!(registry.close_session("kill").await, Some(()));
        assert_eq!(registry.count().await, 1);
        assert!(registry.find_by_id("keep").await.is_some());
        assert!(registry.find_by_id("kill").await.is_none());
    }

    #[tokio::test]
    async fn close_unknown_id_is_noop() {
        let registry = registry(SessionConfig::default());
        assert_eq!(registry.close_session("ghost").await, None);
    }

    #[tokio::test]
    async fn teardown_is_idempotent_and_deletes_temp_dir_once() {
        let registry = registry(SessionConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let session = session(
            "scratch",
            Some(9222),
            SessionGuards {
                temp_data_dir: Some(dir),
                ..SessionGuards::default()
            },
        );
        registry.insert(session.clone()).await;
        assert!(path.exists());

        registry.inner.close(&session).await;
        assert!(!session.is_open());
        assert!(!path.exists());
        assert_eq!(registry.count().await, 0);

        // Second teardown observes the closed flag and does nothing.
        registry.inner.close(&session).await;
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn closed_session_is_absent_from_every_lookup() {
        let registry = registry(SessionConfig::default());
        let session = session("gone", Some(9222), SessionGuards::default());
        registry.insert(session.clone()).await;
        registry.inner.close(&session).await;

        assert!(registry.find_by_id("gone").await.is_none());
        assert!(registry.find_by_control_path("browser/gone").await.is_none());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn close_by_endpoint_matches_exact_endpoint() {
        let registry = registry(SessionConfig::default());
        registry
            .insert(session("ep", Some(9222), SessionGuards::default()))
            .await;

        assert_eq!(
            registry
                .close_by_endpoint("ws://127.0.0.1:9222/devtools/browser/ep")
                .await,
            Some(())
        );
        assert_eq!(registry.close_by_endpoint("ws://elsewhere").await, None);
    }

    #[tokio::test]
    async fn close_all_empties_the_registry() {
        let registry = registry(SessionConfig::default());
        for id in ["a", "b", "c"] {
            registry
                .insert(session(id, Some(9222), SessionGuards::default()))
                .await;
        }
        registry.close_all().await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn keepalive_expiry_tears_the_session_down() {
        let registry = registry(SessionConfig::default());
        let session = session("deadline", Some(9222), SessionGuards::default());
        registry.insert(session.clone()).await;

        arm_keepalive(&registry.inner, &session, 20);
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(!session.is_open());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn touch_cancels_a_pending_keepalive() {
        let registry = registry(SessionConfig::default());
        let session = session("busy", Some(9222), SessionGuards::default());
        registry.insert(session.clone()).await;

        arm_keepalive(&registry.inner, &session, 60);
        registry.touch("busy").await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(session.is_open());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn listing_fails_hard_without_a_debug_port() {
        let registry = registry(SessionConfig::default());
        registry
            .insert(session("portless", None, SessionGuards::default()))
            .await;

        let result = registry.list_sessions().await;
        assert!(matches!(result, Err(SessionError::MissingDebugPort(_))));
    }

    #[tokio::test]
    async fn listing_skips_unreachable_sessions() {
        let registry = registry(SessionConfig::default());
        // Port 1 is never serving a debugging interface.
        registry
            .insert(session("unreachable", Some(1), SessionGuards::default()))
            .await;

        let sessions = registry.list_sessions().await.unwrap();
        assert!(sessions.is_empty());
    }
}
