//! Managed headless-browser sessions behind a proxy-reachable debugging
//! address space.
//!
//! The core launches browser processes (directly, or through a driver that
//! relays the endpoint on its diagnostic stream), opens a CDP control
//! connection to each, tracks them in a process-wide registry, and rewrites
//! their loopback debugging endpoints to an externally routable proxy
//! identity. Teardown is idempotent and runs on explicit kills, keepalive
//! expiry, and OS-level process exits alike.
//!
//! # Example
//!
//! ```ignore
//! use corral_browser::{LaunchRequest, SessionConfig, SessionManager};
//!
//! let manager = SessionManager::new(SessionConfig::default());
//!
//! let request: LaunchRequest = serde_json::from_str(r#"{ "blockAds": "true" }"#)?;
//! let session = manager.launch(request).await?;
//!
//! let sessions = manager.list_sessions().await?;
//! manager.kill(&session.id).await;
//! ```

mod args;
mod blocklist;
pub mod detect;
pub mod error;
pub mod instance;
mod launch;
mod lifecycle;
pub mod manager;
pub mod options;
mod pages;
mod proxy;
pub mod registry;
pub mod types;

pub use {
    error::SessionError,
    instance::BrowserSession,
    manager::SessionManager,
    options::{IgnoreDefaultArgs, LaunchRequest},
    registry::SessionRegistry,
    types::{DebugTarget, EngineVariant, SessionConfig, SessionDescriptor, SessionFlags},
};
