//! Per-page setup, applied to every page an instance opens.
//!
//! Every step is best-effort: a failing hook or CDP call is logged and never
//! aborts the launch or the page attachment.

use std::sync::Arc;

use {
    chromiumoxide::{
        Page,
        cdp::{
            browser_protocol::{
                browser::{SetDownloadBehaviorBehavior, SetDownloadBehaviorParams},
                emulation::SetDeviceMetricsOverrideParams,
                fetch::{
                    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
                    FailRequestParams,
                },
                network::ErrorReason,
                page::SetInterceptFileChooserDialogParams,
            },
            js_protocol::debugger::{EnableParams as DebuggerEnableParams, PauseParams},
        },
    },
    corral_service_traits::PageCreated,
    futures::StreamExt,
    tracing::{debug, warn},
};

use crate::{blocklist, instance::BrowserSession, registry::RegistryInner};

pub(crate) async fn setup_page(
    inner: &Arc<RegistryInner>,
    session: &Arc<BrowserSession>,
    page: &Page,
) {
    let target_id = page.target_id().as_ref().to_string();
    let url = page.url().await.ok().flatten().unwrap_or_default();

    let event = PageCreated {
        browser_id: session.id.clone(),
        target_id,
        url,
    };
    if let Err(e) = inner.hooks.page_created(&event).await {
        warn!(session_id = %session.id, error = %e, "page hook failed");
    }

    // Some browser builds intercept file choosers natively, shadowing any
    // interception a connecting client installs.
    if inner.config.release_file_chooser
        && let Err(e) = page
            .execute(SetInterceptFileChooserDialogParams::new(false))
            .await
    {
        warn!(session_id = %session.id, error = %e, "could not release file chooser interception");
    }

    if inner.config.auto_download_behavior {
        apply_download_behavior(inner, session, page).await;
    }

    if session.flags.pause_on_connect && inner.config.allow_pause_on_connect {
        // Pause before any script runs so a connecting client can attach.
        if let Err(e) = page.execute(DebuggerEnableParams::default()).await {
            warn!(session_id = %session.id, error = %e, "could not enable debugger");
        } else if let Err(e) = page.execute(PauseParams::default()).await {
            warn!(session_id = %session.id, error = %e, "could not pause page");
        }
    }

    if session.flags.block_ads {
        install_ad_filter(session, page).await;
    }

    if let Some((width, height)) = session.window_size {
        apply_viewport(session, page, width, height).await;
    }
}

/// Point the page's downloads at the tracking-id-scoped workspace
/// subdirectory, or the workspace root without a tracking id.
async fn apply_download_behavior(
    inner: &Arc<RegistryInner>,
    session: &Arc<BrowserSession>,
    page: &Page,
) {
    let dir = match &session.tracking_id {
        Some(tracking_id) => inner.config.workspace_dir.join(tracking_id),
        None => inner.config.workspace_dir.clone(),
    };
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        warn!(session_id = %session.id, path = %dir.display(), error = %e, "could not create download dir");
    }

    let params = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::Allow)
        .download_path(dir.display().to_string())
        .build();
    match params {
        Ok(params) => {
            if let Err(e) = page.execute(params).await {
                warn!(session_id = %session.id, error = %e, "could not set download behavior");
            }
        },
        Err(e) => warn!(session_id = %session.id, error = %e, "invalid download behavior params"),
    }
}

/// Enable request interception and filter ad hosts until the page closes.
///
/// The filter inspects the second `/`-segment of each paused request's URL
/// as a domain and aborts blocklisted ones. The task ends when the page's
/// event stream does.
async fn install_ad_filter(session: &Arc<BrowserSession>, page: &Page) {
    if let Err(e) = page.execute(FetchEnableParams::default()).await {
        warn!(session_id = %session.id, error = %e, "could not enable request interception");
        return;
    }
    let mut paused = match page.event_listener::<EventRequestPaused>().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "could not listen for intercepted requests");
            return;
        },
    };

    let page = page.clone();
    let session_id = session.id.clone();
    tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let request_id = event.request_id.clone();
            let outcome = if blocklist::is_blocked(&event.request.url) {
                debug!(session_id = %session_id, url = %event.request.url, "blocked ad request");
                page.execute(FailRequestParams::new(request_id, ErrorReason::BlockedByClient))
                    .await
                    .map(|_| ())
            } else {
                page.execute(ContinueRequestParams::new(request_id))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = outcome {
                debug!(session_id = %session_id, error = %e, "request filter detached");
                break;
            }
        }
    });
}

async fn apply_viewport(session: &Arc<BrowserSession>, page: &Page, width: u32, height: u32) {
    let params = SetDeviceMetricsOverrideParams::builder()
        .width(width)
        .height(height)
        .device_scale_factor(1.0)
        .mobile(false)
        .build();
    match params {
        Ok(params) => {
            if let Err(e) = page.execute(params).await {
                warn!(session_id = %session.id, error = %e, "could not apply window size");
            }
        },
        Err(e) => warn!(session_id = %session.id, error = %e, "invalid viewport params"),
    }
}
