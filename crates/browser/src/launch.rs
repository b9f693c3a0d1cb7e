//! Process launching and control-endpoint discovery.
//!
//! Two launch variants: Chromium spawned directly (endpoint discovered by
//! polling the local version endpoint) and a driver process that spawns the
//! browser itself and announces the endpoint on its diagnostic stream.

use std::{process::Stdio, time::Duration};

use {
    chromiumoxide::Browser,
    futures::StreamExt,
    regex::Regex,
    tokio::{
        io::{AsyncBufRead, AsyncBufReadExt, BufReader},
        process::{Child, Command},
        task::JoinHandle,
        time::{Instant, sleep, timeout},
    },
    tracing::{debug, warn},
};

use crate::{
    args::LaunchPlan,
    detect,
    error::SessionError,
    types::{SessionConfig, VersionInfo},
};

/// Allocate an OS-assigned ephemeral TCP port.
///
/// Free only at the instant of allocation; the readiness poll tolerates the
/// race with the subsequently spawned process.
pub(crate) fn free_port() -> Result<u16, SessionError> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| SessionError::LaunchFailed(format!("could not allocate a port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| SessionError::LaunchFailed(format!("could not read allocated port: {e}")))?
        .port();
    drop(listener);
    Ok(port)
}

/// Spawn Chromium directly and poll its version endpoint until the control
/// endpoint is published. The spawned process is killed on any failure.
pub(crate) async fn spawn_chromium(
    plan: &LaunchPlan,
    config: &SessionConfig,
    http: &reqwest::Client,
) -> Result<(Child, String), SessionError> {
    let binary = detect::resolve_chromium(config.chrome_path.as_deref())?;
    debug!(binary = %binary.display(), port = plan.debug_port, "spawning chromium");

    let mut child = Command::new(&binary)
        .args(&plan.argv)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| SessionError::LaunchFailed(format!("{}: {e}", binary.display())))?;

    match poll_version(http, &config.bind_host, plan.debug_port, config).await {
        Ok(ws_endpoint) => Ok((child, ws_endpoint)),
        Err(e) => {
            shutdown_child(&mut child).await;
            Err(e)
        },
    }
}

/// Poll `GET /json/version` until it answers with a control endpoint, or the
/// launch timeout elapses.
pub(crate) async fn poll_version(
    http: &reqwest::Client,
    bind_host: &str,
    port: u16,
    config: &SessionConfig,
) -> Result<String, SessionError> {
    let url = format!("http://{bind_host}:{port}/json/version");
    let deadline = Instant::now() + Duration::from_millis(config.launch_timeout_ms);

    loop {
        match http.get(&url).send().await {
            Ok(response) => {
                if let Ok(version) = response.json::<VersionInfo>().await
                    && let Some(ws_endpoint) = version.web_socket_debugger_url
                {
                    return Ok(ws_endpoint);
                }
            },
            Err(e) => debug!(url = %url, error = %e, "version endpoint not ready"),
        }
        if Instant::now() >= deadline {
            return Err(SessionError::NotReady(url));
        }
        sleep(Duration::from_millis(config.launch_poll_ms)).await;
    }
}

/// Spawn the driver variant and watch its stderr for the endpoint
/// announcement.
pub(crate) async fn spawn_driver(
    plan: &LaunchPlan,
    config: &SessionConfig,
) -> Result<(Child, String), SessionError> {
    let binary = detect::resolve_driver(config.driver_path.as_deref())?;
    debug!(binary = %binary.display(), port = plan.debug_port, "spawning driver");

    let mut child = Command::new(&binary)
        .args(&plan.argv)
        .arg(format!("--port={}", plan.debug_port))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SessionError::LaunchFailed(format!("{}: {e}", binary.display())))?;

    let Some(stderr) = child.stderr.take() else {
        shutdown_child(&mut child).await;
        return Err(SessionError::LaunchFailed(
            "driver diagnostic stream unavailable".to_string(),
        ));
    };

    let scan = scan_for_endpoint(BufReader::new(stderr));
    match timeout(Duration::from_millis(config.launch_timeout_ms), scan).await {
        Ok(Some(ws_endpoint)) => Ok((child, ws_endpoint)),
        Ok(None) => {
            shutdown_child(&mut child).await;
            Err(SessionError::DriverStreamEnded)
        },
        Err(_) => {
            shutdown_child(&mut child).await;
            Err(SessionError::NotReady(format!(
                "driver diagnostic stream ({})",
                binary.display()
            )))
        },
    }
}

/// Scan a diagnostic stream for the endpoint announcement.
///
/// First match wins; the stream is dropped afterwards. `None` means the
/// stream ended without an announcement.
pub(crate) async fn scan_for_endpoint<R>(reader: R) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    let marker = Regex::new(r"DevTools listening on (ws://\S+)").ok()?;
    let mut lines = reader.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(captures) = marker.captures(&line) {
            return Some(captures.get(1)?.as_str().to_string());
        }
    }
    None
}

/// Open the control connection and drive its event handler in the
/// background.
pub(crate) async fn connect(ws_endpoint: &str) -> Result<(Browser, JoinHandle<()>), SessionError> {
    let (browser, mut handler) = Browser::connect(ws_endpoint).await?;
    let endpoint = ws_endpoint.to_string();
    let task = tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(e) = result {
                debug!(endpoint = %endpoint, error = %e, "control connection event error");
            }
        }
        debug!(endpoint = %endpoint, "control connection handler exited");
    });
    Ok((browser, task))
}

/// Best-effort kill and reap for a process that failed mid-launch.
pub(crate) async fn shutdown_child(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "could not kill spawned process");
    }
    let _ = child.wait().await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            launch_timeout_ms: 500,
            launch_poll_ms: 20,
            ..SessionConfig::default()
        }
    }

    fn mock_port(server: &mockito::Server) -> u16 {
        server
            .host_with_port()
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap()
    }

    #[test]
    fn free_port_returns_bindable_port() {
        let port = free_port().unwrap();
        assert!(port > 0);
        // The port is free again after allocation.
        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
    }

    #[tokio::test]
    async fn scan_finds_first_endpoint_announcement() {
        let stream: &[u8] = b"starting driver\n\
            DevTools listening on ws://127.0.0.1:33411/devtools/browser/abc\n\
            DevTools listening on ws://127.0.0.1:9/devtools/browser/later\n";
        let found = scan_for_endpoint(BufReader::new(stream)).await;
        assert_eq!(
            found.as_deref(),
            Some("ws://127.0.0.1:33411/devtools/browser/abc")
        );
    }

    #[tokio::test]
    async fn scan_returns_none_on_stream_end() {
        let stream: &[u8] = b"driver exited with an error\n";
        assert!(scan_for_endpoint(BufReader::new(stream)).await.is_none());
    }

    #[tokio::test]
    async fn poll_version_reads_control_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/json/version")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"Browser": "Chrome/120.0", "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/f00"}"#,
            )
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let ws = poll_version(&client, "127.0.0.1", mock_port(&server), &fast_config())
            .await
            .unwrap();
        assert_eq!(ws, "ws://127.0.0.1:9222/devtools/browser/f00");
    }

    #[tokio::test]
    async fn poll_version_times_out_without_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/json/version")
            .with_status(500)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let result = poll_version(&client, "127.0.0.1", mock_port(&server), &fast_config()).await;
        assert!(matches!(result, Err(SessionError::NotReady(_))));
    }
}
