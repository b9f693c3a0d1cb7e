//! Session configuration and debugging-interface wire types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which automation back-end launches and owns the browser process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineVariant {
    /// Chromium spawned directly; the control endpoint is discovered by
    /// polling the local debugging HTTP interface.
    #[default]
    Chromium,
    /// A driver binary that spawns the browser itself and relays the
    /// endpoint on its diagnostic stream. Runs without a debugging pipe or
    /// an explicit user data directory, and always headless.
    Driver,
}

/// Launch-time policy toggles consulted when new pages appear.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionFlags {
    pub prebooted: bool,
    pub block_ads: bool,
    pub pause_on_connect: bool,
}

/// Session core configuration.
///
/// Persistent loading is the embedder's job; this struct is the injection
/// point for everything the core does not own: the external proxy identity,
/// the shared workspace root, binary paths, and feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path to the Chromium binary (auto-detected if not set).
    pub chrome_path: Option<String>,
    /// Path to the driver binary for driver-variant launches.
    pub driver_path: Option<String>,
    /// Host the local debugging interfaces bind to.
    pub bind_host: String,
    /// Externally reachable proxy host substituted into advertised
    /// endpoints. When unset, endpoints stay on the bind host.
    pub proxy_host: Option<String>,
    /// Port of the external proxy. When unset, the rewritten URL carries no
    /// explicit port.
    pub proxy_port: Option<u16>,
    /// Whether the external proxy terminates TLS (wss endpoints).
    pub proxy_ssl: bool,
    /// Shared root for per-session download directories.
    pub workspace_dir: PathBuf,
    /// Whether pause-on-connect requests may arm the debugger.
    pub allow_pause_on_connect: bool,
    /// Point each page's downloads at the workspace automatically.
    pub auto_download_behavior: bool,
    /// Release native file-chooser interception on every page so a caller's
    /// own interception is not shadowed.
    pub release_file_chooser: bool,
    /// How long to wait for a spawned process to publish its endpoint.
    pub launch_timeout_ms: u64,
    /// Delay between readiness probes of the version endpoint.
    pub launch_poll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            driver_path: None,
            bind_host: "127.0.0.1".to_string(),
            proxy_host: None,
            proxy_port: None,
            proxy_ssl: false,
            workspace_dir: std::env::temp_dir().join("corral-workspace"),
            allow_pause_on_connect: true,
            auto_download_behavior: true,
            release_file_chooser: false,
            launch_timeout_ms: 30_000,
            launch_poll_ms: 200,
        }
    }
}

/// `GET /json/version` response; only the control endpoint matters here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

/// One entry of `GET /json/list`.
///
/// Unknown fields ride along in `rest` so the proxy rewrite preserves them
/// verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_socket_debugger_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devtools_frontend_url: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// Externally addressable descriptor for one open page.
///
/// Derived on every listing call from the owning instance and its advertised
/// target, never cached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub browser_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    /// Rewritten control-connection endpoint of the owning instance.
    pub browser_ws_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_socket_debugger_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devtools_frontend_url: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.bind_host, "127.0.0.1");
        assert!(config.proxy_host.is_none());
        assert!(!config.proxy_ssl);
        assert!(config.allow_pause_on_connect);
        assert!(config.auto_download_behavior);
        assert!(config.launch_timeout_ms > 0);
    }

    #[test]
    fn engine_variant_deserializes_lowercase() {
        let chromium: EngineVariant = serde_json::from_str("\"chromium\"").unwrap();
        assert_eq!(chromium, EngineVariant::Chromium);
        let driver: EngineVariant = serde_json::from_str("\"driver\"").unwrap();
        assert_eq!(driver, EngineVariant::Driver);
    }

    #[test]
    fn debug_target_preserves_unknown_fields() {
        let raw = serde_json::json!({
            "id": "CAFE",
            "type": "page",
            "title": "Example",
            "url": "https://example.com/",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/CAFE",
            "devtoolsFrontendUrl": "/devtools/inspector.html?ws=127.0.0.1:9222/devtools/page/CAFE"
        });
        let target: DebugTarget = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(target.rest["id"], "CAFE");
        assert_eq!(target.rest["title"], "Example");

        let back = serde_json::to_value(&target).unwrap();
        assert_eq!(back, raw);
    }
}
