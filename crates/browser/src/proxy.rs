//! Debug-session proxy rewriting.
//!
//! Each live instance advertises its open pages on a loopback address. The
//! rewriter substitutes the configured external proxy identity into the
//! control endpoint, the per-target WebSocket debugger URL, and the
//! ws-location query parameter of the devtools-frontend URL, leaving the
//! path and every other target field untouched. Without a configured proxy
//! the endpoints stay on the local bind host and port.

use url::Url;

use crate::{
    error::SessionError,
    instance::BrowserSession,
    types::{DebugTarget, SessionConfig, SessionDescriptor},
};

/// Fetch an instance's currently open targets and rewrite each into an
/// externally addressable descriptor. Never cached.
pub(crate) async fn instance_targets(
    http: &reqwest::Client,
    config: &SessionConfig,
    session: &BrowserSession,
) -> Result<Vec<SessionDescriptor>, SessionError> {
    let port = session
        .debug_port
        .ok_or_else(|| SessionError::MissingDebugPort(session.id.clone()))?;

    let url = format!("http://{}:{}/json/list", config.bind_host, port);
    let targets: Vec<DebugTarget> = http
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    targets
        .into_iter()
        .map(|target| rewrite_target(config, session, target))
        .collect()
}

/// Rewrite one advertised target. Host, protocol, and the ws-location query
/// parameter change; everything else is preserved verbatim.
pub(crate) fn rewrite_target(
    config: &SessionConfig,
    session: &BrowserSession,
    target: DebugTarget,
) -> Result<SessionDescriptor, SessionError> {
    Ok(SessionDescriptor {
        browser_id: session.id.clone(),
        tracking_id: session.tracking_id.clone(),
        browser_ws_endpoint: rewrite_ws_endpoint(config, &session.ws_endpoint)?,
        web_socket_debugger_url: target
            .web_socket_debugger_url
            .as_deref()
            .map(|u| rewrite_ws_endpoint(config, u))
            .transpose()?,
        devtools_frontend_url: target
            .devtools_frontend_url
            .as_deref()
            .map(|u| rewrite_frontend_url(config, u)),
        rest: target.rest,
    })
}

/// Substitute the external proxy identity into a WebSocket endpoint. The
/// path is kept as advertised.
pub(crate) fn rewrite_ws_endpoint(
    config: &SessionConfig,
    raw: &str,
) -> Result<String, SessionError> {
    let Some(proxy_host) = &config.proxy_host else {
        return Ok(raw.to_string());
    };

    let mut url =
        Url::parse(raw).map_err(|e| SessionError::InvalidEndpoint(format!("{raw}: {e}")))?;
    let scheme = if config.proxy_ssl { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| SessionError::InvalidEndpoint(raw.to_string()))?;
    url.set_host(Some(proxy_host))
        .map_err(|e| SessionError::InvalidEndpoint(format!("{raw}: {e}")))?;
    url.set_port(config.proxy_port)
        .map_err(|()| SessionError::InvalidEndpoint(raw.to_string()))?;
    Ok(url.to_string())
}

/// Substitute the external proxy identity into the `ws=` query parameter of
/// a devtools-frontend URL, which encodes the WebSocket location as a bare
/// authority plus path.
pub(crate) fn rewrite_frontend_url(config: &SessionConfig, raw: &str) -> String {
    let Some(proxy_host) = &config.proxy_host else {
        return raw.to_string();
    };

    let marker = if raw.contains("wss=") { "wss=" } else { "ws=" };
    let Some((prefix, rest)) = raw.split_once(marker) else {
        return raw.to_string();
    };
    let path = match rest.split_once('/') {
        Some((_, path)) => format!("/{path}"),
        None => String::new(),
    };

    let new_marker = if config.proxy_ssl { "wss=" } else { "ws=" };
    let new_authority = match config.proxy_port {
        Some(port) => format!("{proxy_host}:{port}"),
        None => proxy_host.clone(),
    };
    format!("{prefix}{new_marker}{new_authority}{path}")
}
