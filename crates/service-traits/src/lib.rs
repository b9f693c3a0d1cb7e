//! Lifecycle capability traits for the session core.
//!
//! The core invokes these hooks at instance and page creation but never
//! implements them; an embedding server injects its own implementation at
//! construction time. `NoopLifecycleHooks` lets the core run (and be tested)
//! standalone.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

/// Error type returned by hook implementations.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("{message}")]
    Message { message: String },
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

impl HookError {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }
}

impl From<String> for HookError {
    fn from(value: String) -> Self {
        Self::message(value)
    }
}

impl From<&str> for HookError {
    fn from(value: &str) -> Self {
        Self::message(value)
    }
}

pub type HookResult<T = ()> = Result<T, HookError>;

// ── Events ──────────────────────────────────────────────────────────────────

/// Payload delivered when a managed browser instance finishes construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserCreated {
    /// Registry identifier of the new instance.
    pub id: String,
    /// Control-connection endpoint the core opened.
    pub ws_endpoint: String,
    /// Caller-supplied correlation id, if any.
    pub tracking_id: Option<String>,
}

/// Payload delivered for every page the instance opens, present or future.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageCreated {
    /// Registry identifier of the owning instance.
    pub browser_id: String,
    /// CDP target id of the page.
    pub target_id: String,
    /// Page URL at creation time.
    pub url: String,
}

// ── LifecycleHooks ──────────────────────────────────────────────────────────

/// Hooks the session core calls out to. Failures are caught and logged by the
/// caller; they never abort a launch or page attachment.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    async fn browser_created(&self, event: &BrowserCreated) -> HookResult;
    async fn page_created(&self, event: &PageCreated) -> HookResult;
}

/// Default implementation that observes nothing.
pub struct NoopLifecycleHooks;

#[async_trait]
impl LifecycleHooks for NoopLifecycleHooks {
    async fn browser_created(&self, event: &BrowserCreated) -> HookResult {
        debug!(id = %event.id, "browser created (no hooks installed)");
        Ok(())
    }

    async fn page_created(&self, event: &PageCreated) -> HookResult {
        debug!(
            browser_id = %event.browser_id,
            target_id = %event.target_id,
            "page created (no hooks installed)"
        );
        Ok(())
    }
}
