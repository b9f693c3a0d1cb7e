//! Instance construction finishing and process-exit supervision.

use std::sync::{Arc, Weak};

use {
    chromiumoxide::{Browser, cdp::browser_protocol::target::EventTargetCreated},
    corral_service_traits::BrowserCreated,
    futures::StreamExt,
    tokio::{process::Child, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    args::LaunchPlan,
    error::SessionError,
    instance::{BrowserSession, ExitGuard, SessionGuards},
    options::LaunchRequest,
    pages,
    registry::{self, RegistryInner, SessionRegistry},
    types::{EngineVariant, SessionFlags},
};

/// The registry identifier: the trailing path segment of the control
/// endpoint.
pub(crate) fn derive_session_id(ws_endpoint: &str) -> String {
    ws_endpoint
        .rsplit('/')
        .next()
        .unwrap_or(ws_endpoint)
        .to_string()
}

/// Port advertised by a discovered endpoint URL, when one is present.
pub(crate) fn endpoint_port(ws_endpoint: &str) -> Option<u16> {
    url::Url::parse(ws_endpoint).ok().and_then(|u| u.port())
}

/// Finish constructing a managed instance: populate the record, invoke the
/// instance hook, install the exit watcher, set up present and future pages,
/// arm the keepalive, then register.
pub(crate) async fn register_instance(
    registry: &SessionRegistry,
    child: Child,
    browser: Browser,
    handler: JoinHandle<()>,
    plan: LaunchPlan,
    request: &LaunchRequest,
    ws_endpoint: String,
) -> Result<Arc<BrowserSession>, SessionError> {
    let LaunchPlan {
        engine,
        debug_port,
        headless,
        window_size,
        temp_data_dir,
        ..
    } = plan;
    let inner = &registry.inner;

    let id = derive_session_id(&ws_endpoint);
    let debug_port = match engine {
        EngineVariant::Chromium => Some(debug_port),
        EngineVariant::Driver => endpoint_port(&ws_endpoint),
    };
    let flags = SessionFlags {
        prebooted: request.prebooted,
        block_ads: request.block_ads.unwrap_or(false),
        pause_on_connect: request.pause_on_connect.unwrap_or(false),
    };

    let browser = Arc::new(browser);
    let session = Arc::new(BrowserSession::new(
        id.clone(),
        ws_endpoint.clone(),
        debug_port,
        request.tracking_id.clone(),
        engine,
        flags,
        window_size,
        SessionGuards {
            browser: Some(browser.clone()),
            handler: Some(handler),
            temp_data_dir,
            ..SessionGuards::default()
        },
    ));

    let created = BrowserCreated {
        id: id.clone(),
        ws_endpoint,
        tracking_id: session.tracking_id.clone(),
    };
    if let Err(e) = inner.hooks.browser_created(&created).await {
        warn!(session_id = %id, error = %e, "browser hook failed");
    }

    let exit = spawn_exit_watcher(Arc::downgrade(inner), id.clone(), child);
    session.install(|guards| guards.exit = Some(exit));

    match browser.pages().await {
        Ok(open_pages) => {
            for page in open_pages {
                pages::setup_page(inner, &session, &page).await;
            }
        },
        Err(e) => warn!(session_id = %id, error = %e, "could not enumerate initial pages"),
    }

    match spawn_target_monitor(inner, &session, &browser).await {
        Ok(monitor) => session.install(|guards| guards.monitor = Some(monitor)),
        Err(e) => warn!(session_id = %id, error = %e, "could not watch for new pages"),
    }

    if let Some(deadline_ms) = request.keepalive {
        registry::arm_keepalive(inner, &session, deadline_ms);
    }

    registry.insert(session.clone()).await;
    info!(
        session_id = %id,
        engine = ?session.engine,
        port = ?session.debug_port,
        headless,
        tracking_id = ?session.tracking_id,
        "session registered"
    );
    Ok(session)
}

/// Watch the owned process. If it exits for any reason, teardown runs
/// automatically; cancelling the token detaches the watcher, which then
/// kills and reaps the process itself.
fn spawn_exit_watcher(inner: Weak<RegistryInner>, id: String, mut child: Child) -> ExitGuard {
    let token = CancellationToken::new();
    let detach = token.clone();
    let task = tokio::spawn(async move {
        tokio::select! {
            () = detach.cancelled() => {
                if let Err(e) = child.start_kill() {
                    debug!(session_id = %id, error = %e, "process already gone");
                }
                let _ = child.wait().await;
            },
            status = child.wait() => {
                match status {
                    Ok(status) => {
                        info!(session_id = %id, code = ?status.code(), "browser process exited");
                    },
                    Err(e) => warn!(session_id = %id, error = %e, "failed waiting on browser process"),
                }
                if let Some(inner) = inner.upgrade() {
                    inner.close_by_id(&id).await;
                }
            },
        }
    });
    ExitGuard { token, task }
}

/// Apply page setup to every page target the instance creates from now on.
async fn spawn_target_monitor(
    inner: &Arc<RegistryInner>,
    session: &Arc<BrowserSession>,
    browser: &Arc<Browser>,
) -> Result<JoinHandle<()>, SessionError> {
    let mut created = browser.event_listener::<EventTargetCreated>().await?;
    let weak = Arc::downgrade(inner);
    let session = session.clone();
    let browser = browser.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = created.next().await {
            if event.target_info.r#type != "page" {
                continue;
            }
            let Some(inner) = weak.upgrade() else { break };
            match browser.get_page(event.target_info.target_id.clone()).await {
                Ok(page) => pages::setup_page(&inner, &session, &page).await,
                Err(e) => {
                    debug!(session_id = %session.id, error = %e, "could not attach to new page");
                },
            }
        }
    });
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_trailing_path_segment() {
        assert_eq!(
            derive_session_id("ws://127.0.0.1:9222/devtools/browser/0b4cafe"),
            "0b4cafe"
        );
        // A bare authority endpoint keeps its last segment semantics.
        assert_eq!(derive_session_id("ws://127.0.0.1:9222"), "127.0.0.1:9222");
    }

    #[test]
    fn endpoint_port_parses_when_present() {
        assert_eq!(
            endpoint_port("ws://127.0.0.1:33411/devtools/browser/abc"),
            Some(33411)
        );
        assert_eq!(endpoint_port("not a url"), None);
    }
}
