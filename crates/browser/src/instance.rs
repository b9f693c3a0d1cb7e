//! Managed browser instances and the resources they own.

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use {
    chromiumoxide::Browser,
    tempfile::TempDir,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
};

use crate::types::{EngineVariant, SessionFlags};

/// Process-exit watcher handle.
///
/// Cancelling the token detaches the watcher: instead of re-entering
/// teardown it kills and reaps the owned process, then exits.
pub(crate) struct ExitGuard {
    pub token: CancellationToken,
    #[allow(dead_code)]
    pub task: JoinHandle<()>,
}

/// Pending keepalive deadline. Cancelling the token discards the deadline.
pub(crate) struct KeepaliveGuard {
    pub token: CancellationToken,
    #[allow(dead_code)]
    pub task: JoinHandle<()>,
}

/// Resources owned by a live session, taken exactly once at teardown.
#[derive(Default)]
pub(crate) struct SessionGuards {
    /// Control connection. Dropped at teardown without a protocol-level
    /// close.
    pub browser: Option<Arc<Browser>>,
    /// Task driving the control connection's event handler.
    pub handler: Option<JoinHandle<()>>,
    /// Task watching for newly created pages.
    pub monitor: Option<JoinHandle<()>>,
    pub exit: Option<ExitGuard>,
    pub keepalive: Option<KeepaliveGuard>,
    /// Generated scratch profile, deleted at teardown.
    pub temp_data_dir: Option<TempDir>,
}

/// A tracked, owned browser process plus its control connection and
/// metadata. One per launched process.
pub struct BrowserSession {
    /// Trailing path segment of the control endpoint; unique among live
    /// instances.
    pub id: String,
    /// Control-connection endpoint; immutable after creation.
    pub ws_endpoint: String,
    /// Local debugging port, when one is discoverable.
    pub debug_port: Option<u16>,
    /// Opaque caller-supplied correlation string.
    pub tracking_id: Option<String>,
    pub started_at: SystemTime,
    pub engine: EngineVariant,
    pub flags: SessionFlags,
    /// Path of the generated scratch profile, when this instance owns one.
    pub data_dir_path: Option<PathBuf>,
    /// Window size parsed from the launch arguments, applied to new pages.
    pub window_size: Option<(u32, u32)>,
    is_open: AtomicBool,
    guards: Mutex<SessionGuards>,
}

impl BrowserSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        ws_endpoint: String,
        debug_port: Option<u16>,
        tracking_id: Option<String>,
        engine: EngineVariant,
        flags: SessionFlags,
        window_size: Option<(u32, u32)>,
        guards: SessionGuards,
    ) -> Self {
        let data_dir_path = guards
            .temp_data_dir
            .as_ref()
            .map(|dir| dir.path().to_path_buf());
        Self {
            id,
            ws_endpoint,
            debug_port,
            tracking_id,
            started_at: SystemTime::now(),
            engine,
            flags,
            data_dir_path,
            window_size,
            is_open: AtomicBool::new(true),
            guards: Mutex::new(guards),
        }
    }

    /// True from creation until teardown completes.
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    /// Whether this instance generated (and owns) its profile directory.
    pub fn uses_temp_data_dir(&self) -> bool {
        self.data_dir_path.is_some()
    }

    /// Flip the open flag. Returns true for exactly one caller; teardown
    /// proceeds only on that true.
    pub(crate) fn mark_closed(&self) -> bool {
        self.is_open.swap(false, Ordering::SeqCst)
    }

    /// Take every owned resource. Empty on every call after the first.
    pub(crate) fn take_guards(&self) -> SessionGuards {
        let mut guards = self.guards.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *guards)
    }

    /// Mutate the guard block in place (used while wiring up a new
    /// instance).
    pub(crate) fn install(&self, install: impl FnOnce(&mut SessionGuards)) {
        let mut guards = self.guards.lock().unwrap_or_else(|e| e.into_inner());
        install(&mut guards);
    }

    /// Remove and return the pending keepalive, if any. Activity and
    /// teardown both go through here so the deadline can never fire twice.
    pub(crate) fn take_keepalive(&self) -> Option<KeepaliveGuard> {
        let mut guards = self.guards.lock().unwrap_or_else(|e| e.into_inner());
        guards.keepalive.take()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn bare_session(guards: SessionGuards) -> BrowserSession {
        BrowserSession::new(
            "abc123".to_string(),
            "ws://127.0.0.1:9222/devtools/browser/abc123".to_string(),
            Some(9222),
            None,
            EngineVariant::Chromium,
            SessionFlags::default(),
            None,
            guards,
        )
    }

    #[test]
    fn mark_closed_returns_true_exactly_once() {
        let session = bare_session(SessionGuards::default());
        assert!(session.is_open());
        assert!(session.mark_closed());
        assert!(!session.mark_closed());
        assert!(!session.is_open());
    }

    #[test]
    fn take_guards_is_empty_after_first_take() {
        let guards = SessionGuards {
            temp_data_dir: Some(tempfile::tempdir().unwrap()),
            ..SessionGuards::default()
        };
        let session = bare_session(guards);
        assert!(session.uses_temp_data_dir());

        let taken = session.take_guards();
        assert!(taken.temp_data_dir.is_some());
        let again = session.take_guards();
        assert!(again.temp_data_dir.is_none());
    }

    #[test]
    fn data_dir_path_mirrors_owned_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().to_path_buf();
        let session = bare_session(SessionGuards {
            temp_data_dir: Some(dir),
            ..SessionGuards::default()
        });
        assert_eq!(session.data_dir_path.as_deref(), Some(expected.as_path()));
    }
}
