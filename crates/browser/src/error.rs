//! Session error types.

use thiserror::Error;

/// Errors that can occur while launching, tracking, or listing sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser not available: {0}")]
    BrowserNotAvailable(String),

    #[error("launch failed: {0}")]
    LaunchFailed(String),

    #[error("debugging endpoint never became ready: {0}")]
    NotReady(String),

    #[error("driver closed its diagnostic stream before publishing an endpoint")]
    DriverStreamEnded,

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session {0} has no discoverable debugging port")]
    MissingDebugPort(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("debugging interface request failed: {0}")]
    DebugInterface(#[from] reqwest::Error),

    #[error("CDP error: {0}")]
    Cdp(String),
}

impl From<chromiumoxide::error::CdpError> for SessionError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        SessionError::Cdp(err.to_string())
    }
}
