//! Host keystroke tap infrastructure.
//!
//! The tap inserts an interceptor at the point where key-down/key-up events
//! are dispatched to foreground applications.  For every event the
//! installed callback decides [`TapDecision::Pass`] (the event continues to
//! the host) or [`TapDecision::Drop`] (nothing downstream sees it).
//!
//! The host API does not reveal which device produced an event, so the
//! callback cannot filter by provenance here; that inference is the
//! correlator's job.  The callback runs on the tap's dispatch thread and
//! must stay short and non-blocking — the correlator's decision functions
//! are O(1) map operations for exactly this reason.
//!
//! On macOS the production implementation is a CGEventTap on a dedicated
//! run-loop thread; everywhere else the mock tap stands in.

use std::sync::Arc;

use keyrelay_core::HostEvent;

pub mod mock;

#[cfg(target_os = "macos")]
pub mod macos;

/// Verdict for one intercepted host event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapDecision {
    /// Forward the event to the host as usual.
    Pass,
    /// Consume the event; it never reaches applications.
    Drop,
}

/// Decision callback invoked synchronously for every intercepted event.
pub type TapCallback = Arc<dyn Fn(HostEvent) -> TapDecision + Send + Sync>;

/// Error type for tap operations.
#[derive(Debug, thiserror::Error)]
pub enum TapError {
    /// The host refused the tap without an explicit user grant.
    /// Recoverable: surface to the operator, never retried automatically.
    #[error("event tap permission denied; grant input monitoring to this process")]
    PermissionDenied,
    #[error("failed to install event tap: {0}")]
    InstallFailed(String),
    #[error("event tap already installed")]
    AlreadyInstalled,
    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),
}

/// Trait abstracting the host event tap.
pub trait HostTap: Send + Sync {
    /// Dry-open permission probe, used by the supervisor while Preparing.
    ///
    /// Does not install anything; returns [`TapError::PermissionDenied`]
    /// when an install would be refused.
    fn probe_permission(&self) -> Result<(), TapError>;

    /// Installs the interceptor with the given decision callback.
    fn install(&self, callback: TapCallback) -> Result<(), TapError>;

    /// Uninstalls the interceptor.  Idempotent.
    fn uninstall(&self);
}
