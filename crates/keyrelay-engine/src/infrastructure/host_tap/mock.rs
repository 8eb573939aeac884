//! Mock host tap for unit and integration testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use keyrelay_core::HostEvent;

use super::{HostTap, TapCallback, TapDecision, TapError};

/// A mock implementation of [`HostTap`] that lets tests deliver synthetic
/// host events to the installed callback and observe the decisions.
pub struct MockHostTap {
    callback: Mutex<Option<TapCallback>>,
    permission_granted: AtomicBool,
}

impl MockHostTap {
    pub fn new() -> Self {
        Self {
            callback: Mutex::new(None),
            permission_granted: AtomicBool::new(true),
        }
    }

    /// Configures whether permission probes and installs succeed.
    pub fn set_permission_granted(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
    }

    /// Delivers a host event to the installed callback, as the tap thread
    /// would.  Returns `None` when no tap is installed — the event reaches
    /// the host unfiltered, which is how callers should treat it.
    pub fn deliver(&self, event: HostEvent) -> Option<TapDecision> {
        let guard = self.callback.lock().expect("lock poisoned");
        guard.as_ref().map(|cb| cb(event))
    }

    pub fn installed(&self) -> bool {
        self.callback.lock().expect("lock poisoned").is_some()
    }
}

impl Default for MockHostTap {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTap for MockHostTap {
    fn probe_permission(&self) -> Result<(), TapError> {
        if self.permission_granted.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TapError::PermissionDenied)
        }
    }

    fn install(&self, callback: TapCallback) -> Result<(), TapError> {
        if !self.permission_granted.load(Ordering::SeqCst) {
            return Err(TapError::PermissionDenied);
        }
        let mut guard = self.callback.lock().expect("lock poisoned");
        if guard.is_some() {
            return Err(TapError::AlreadyInstalled);
        }
        *guard = Some(callback);
        Ok(())
    }

    fn uninstall(&self) {
        *self.callback.lock().expect("lock poisoned") = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::KeyDirection;
    use std::sync::Arc;
    use std::time::Instant;

    fn down(key_code: i32) -> HostEvent {
        HostEvent {
            key_code,
            direction: KeyDirection::Down,
            at: Instant::now(),
        }
    }

    #[test]
    fn test_deliver_routes_to_installed_callback() {
        // Arrange
        let tap = MockHostTap::new();
        tap.install(Arc::new(|e: HostEvent| {
            if e.key_code == 13 {
                TapDecision::Drop
            } else {
                TapDecision::Pass
            }
        }))
        .expect("install should succeed");

        // Act / Assert
        assert_eq!(tap.deliver(down(13)), Some(TapDecision::Drop));
        assert_eq!(tap.deliver(down(12)), Some(TapDecision::Pass));
    }

    #[test]
    fn test_deliver_without_install_returns_none() {
        let tap = MockHostTap::new();
        assert_eq!(tap.deliver(down(13)), None);
    }

    #[test]
    fn test_uninstall_stops_interception() {
        let tap = MockHostTap::new();
        tap.install(Arc::new(|_| TapDecision::Drop))
            .expect("install should succeed");
        assert!(tap.installed());

        tap.uninstall();

        assert!(!tap.installed());
        assert_eq!(tap.deliver(down(13)), None);
    }

    #[test]
    fn test_denied_permission_blocks_probe_and_install() {
        let tap = MockHostTap::new();
        tap.set_permission_granted(false);

        assert!(matches!(
            tap.probe_permission(),
            Err(TapError::PermissionDenied)
        ));
        assert!(matches!(
            tap.install(Arc::new(|_| TapDecision::Pass)),
            Err(TapError::PermissionDenied)
        ));
    }

    #[test]
    fn test_double_install_is_rejected() {
        let tap = MockHostTap::new();
        tap.install(Arc::new(|_| TapDecision::Pass))
            .expect("first install succeeds");

        let second = tap.install(Arc::new(|_| TapDecision::Pass));
        assert!(matches!(second, Err(TapError::AlreadyInstalled)));
    }
}
