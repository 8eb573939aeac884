//! Recording guest controller for unit and integration testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use keyrelay_core::RelayIntent;

use super::{Guest, GuestController, RelayError};

/// A [`GuestController`] test double that records every relayed intent.
pub struct RecordingGuestController {
    pub sent: Mutex<Vec<RelayIntent>>,
    guests: Mutex<Vec<Guest>>,
    fail_sends: AtomicBool,
}

impl RecordingGuestController {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            guests: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        }
    }

    pub fn with_guests(guests: Vec<Guest>) -> Self {
        let ctl = Self::new();
        *ctl.guests.lock().expect("lock poisoned") = guests;
        ctl
    }

    /// Makes every subsequent `send_key_event` fail with a non-zero exit.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every intent relayed so far, in invocation order.
    pub fn sent_snapshot(&self) -> Vec<RelayIntent> {
        self.sent.lock().expect("lock poisoned").clone()
    }
}

impl Default for RecordingGuestController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GuestController for RecordingGuestController {
    async fn send_key_event(&self, intent: RelayIntent) -> Result<(), RelayError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(RelayError::SendFailed {
                guest: intent.target,
                scan_code: intent.scan_code,
                code: 1,
                stderr: "injected failure".to_string(),
            });
        }
        self.sent.lock().expect("lock poisoned").push(intent);
        Ok(())
    }

    async fn list_guests(&self) -> Result<Vec<Guest>, RelayError> {
        Ok(self.guests.lock().expect("lock poisoned").clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::RelayDirection;

    fn intent(scan_code: i32) -> RelayIntent {
        RelayIntent {
            scan_code,
            direction: RelayDirection::Press,
            target: Uuid::nil(),
        }
    }

    #[tokio::test]
    async fn test_recording_controller_captures_intents_in_order() {
        let ctl = RecordingGuestController::new();

        ctl.send_key_event(intent(17)).await.expect("send ok");
        ctl.send_key_event(intent(57)).await.expect("send ok");

        let sent = ctl.sent_snapshot();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].scan_code, 17);
        assert_eq!(sent[1].scan_code, 57);
    }

    #[tokio::test]
    async fn test_injected_failure_is_reported_not_recorded() {
        let ctl = RecordingGuestController::new();
        ctl.set_fail_sends(true);

        let result = ctl.send_key_event(intent(17)).await;

        assert!(matches!(result, Err(RelayError::SendFailed { .. })));
        assert!(ctl.sent_snapshot().is_empty());
    }
}
