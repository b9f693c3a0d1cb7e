//! Session manager: the published API over launching, listing, and killing
//! managed browser instances.

use std::sync::Arc;

use {
    corral_service_traits::{LifecycleHooks, NoopLifecycleHooks},
    tracing::{info, warn},
};

use crate::{
    args,
    error::SessionError,
    instance::BrowserSession,
    launch, lifecycle,
    options::LaunchRequest,
    registry::SessionRegistry,
    types::{EngineVariant, SessionConfig, SessionDescriptor},
};

/// Launches browser processes, tracks them in a shared registry, and
/// republishes their debugging endpoints under the configured proxy
/// identity.
pub struct SessionManager {
    registry: SessionRegistry,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionManager {
    /// Create a manager with no lifecycle hooks installed.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_hooks(config, Arc::new(NoopLifecycleHooks))
    }

    /// Create a manager with caller-supplied lifecycle hooks.
    pub fn with_hooks(config: SessionConfig, hooks: Arc<dyn LifecycleHooks>) -> Self {
        info!(
            proxy_host = ?config.proxy_host,
            workspace = %config.workspace_dir.display(),
            "session manager initialized"
        );
        Self {
            registry: SessionRegistry::new(config, hooks),
        }
    }

    /// The underlying registry handle.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Launch a new managed instance from a loose request.
    ///
    /// Launch failures close the partially started process and propagate;
    /// they are never retried here.
    pub async fn launch(&self, request: LaunchRequest) -> Result<Arc<BrowserSession>, SessionError> {
        let port = launch::free_port()?;
        let plan = args::build_launch_plan(&request, port)?;
        let inner = &self.registry.inner;

        let spawned = match plan.engine {
            EngineVariant::Chromium => {
                launch::spawn_chromium(&plan, &inner.config, &inner.http).await
            },
            EngineVariant::Driver => launch::spawn_driver(&plan, &inner.config).await,
        };
        let (mut child, ws_endpoint) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(engine = ?plan.engine, error = %e, "launch failed");
                return Err(e);
            },
        };

        let (browser, handler) = match launch::connect(&ws_endpoint).await {
            Ok(connected) => connected,
            Err(e) => {
                warn!(endpoint = %ws_endpoint, error = %e, "control connection failed");
                launch::shutdown_child(&mut child).await;
                return Err(e);
            },
        };

        lifecycle::register_instance(
            &self.registry,
            child,
            browser,
            handler,
            plan,
            &request,
            ws_endpoint,
        )
        .await
    }

    /// Every advertised debugging session across all live instances,
    /// rewritten to the proxy identity. Recomputed on each call.
    pub async fn list_sessions(&self) -> Result<Vec<SessionDescriptor>, SessionError> {
        self.registry.list_sessions().await
    }

    /// Find the first advertised page whose URLs contain the path fragment.
    pub async fn find_session_by_page_path(
        &self,
        fragment: &str,
    ) -> Result<Option<SessionDescriptor>, SessionError> {
        self.registry.find_by_page_path(fragment).await
    }

    /// Find the instance whose control endpoint contains the path fragment.
    pub async fn find_session_by_control_path(
        &self,
        fragment: &str,
    ) -> Option<Arc<BrowserSession>> {
        self.registry.find_by_control_path(fragment).await
    }

    /// Number of live instances.
    pub async fn count(&self) -> usize {
        self.registry.count().await
    }

    /// Tear down one instance. `None` when the id is unknown.
    pub async fn kill(&self, id: &str) -> Option<()> {
        self.registry.close_session(id).await
    }

    /// Tear down every live instance.
    pub async fn kill_all(&self) {
        self.registry.close_all().await;
    }

    /// Record activity on a session, cancelling its keepalive deadline.
    pub async fn touch(&self, id: &str) -> Option<()> {
        self.registry.touch(id).await
    }

    /// Tear everything down before the embedder exits.
    pub async fn shutdown(&self) {
        self.kill_all().await;
        info!("session manager shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manager_starts_empty() {
        let manager = SessionManager::default();
        assert_eq!(manager.count().await, 0);
        assert!(manager.list_sessions().await.is_ok_and(|s| s.is_empty()));
    }

    #[tokio::test]
    async fn kill_unknown_id_is_noop() {
        let manager = SessionManager::default();
        assert_eq!(manager.kill("nonexistent").await, None);
    }

    #[tokio::test]
    async fn shutdown_on_empty_registry() {
        let manager = SessionManager::default();
        manager.shutdown().await;
        assert_eq!(manager.count().await, 0);
    }

    #[tokio::test]
    async fn find_by_control_path_on_empty_registry() {
        let manager = SessionManager::default();
        assert!(
            manager
                .find_session_by_control_path("devtools/browser")
                .await
                .is_none()
        );
    }
}
