//! Relay forwarding: drain the intent queue into controller invocations.
//!
//! Each controller invocation takes ~150 ms.  Purely serial forwarding
//! produced visible lag-then-burst during fast typing; unbounded
//! parallelism hammers the controller.  Two in-flight invocations keep the
//! queue drained at human typing rates while staying safe for the
//! controller.
//!
//! The permit is acquired *before* the worker task is spawned, so
//! invocations start in dequeue order.  With two in flight the guest may
//! still observe a release of one key before a press of a *different* key
//! enqueued earlier finishes; per-key ordering is what matters, and that
//! holds because the device stream records a Down with the correlator
//! before enqueuing it, so a key's press intent always precedes its
//! release intent in the queue.

use std::sync::Arc;

use keyrelay_core::RelayIntent;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::error;

use crate::events::EngineEvent;
use crate::infrastructure::guest::GuestController;

/// Maximum concurrent controller invocations.
pub const MAX_IN_FLIGHT: usize = 2;

/// Depth of the relay intent queue between the HID thread and the forwarder.
pub const RELAY_QUEUE_DEPTH: usize = 256;

/// Spawns the forwarder task.
///
/// Runs until the intent sender is dropped (session teardown); intents
/// already queued and in-flight invocations are allowed to complete.
pub fn spawn_forwarder(
    mut intents: mpsc::Receiver<RelayIntent>,
    controller: Arc<dyn GuestController>,
    events: mpsc::UnboundedSender<EngineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let permits = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
        while let Some(intent) = intents.recv().await {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            let controller = Arc::clone(&controller);
            let events = events.clone();
            tokio::spawn(async move {
                match controller.send_key_event(intent).await {
                    Ok(()) => {
                        let _ = events.send(EngineEvent::RelayCompleted {
                            scan_code: intent.scan_code,
                            direction: intent.direction,
                            guest: intent.target,
                        });
                    }
                    Err(e) => {
                        // The key event is lost; retrying risks stuck-key
                        // semantics on the guest.
                        error!(
                            scan_code = intent.scan_code,
                            guest = %intent.target,
                            error = %e,
                            "relay invocation failed"
                        );
                        let _ = events.send(EngineEvent::RelayFailed {
                            scan_code: intent.scan_code,
                            direction: intent.direction,
                            guest: intent.target,
                            error: e.to_string(),
                        });
                    }
                }
                drop(permit);
            });
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::guest::mock::RecordingGuestController;
    use keyrelay_core::RelayDirection;
    use std::time::Duration;
    use uuid::Uuid;

    fn intent(scan_code: i32, direction: RelayDirection) -> RelayIntent {
        RelayIntent {
            scan_code,
            direction,
            target: Uuid::nil(),
        }
    }

    #[tokio::test]
    async fn test_forwarder_drains_queue_and_exits_when_sender_drops() {
        // Arrange
        let controller = Arc::new(RecordingGuestController::new());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::channel(RELAY_QUEUE_DEPTH);
        let handle = spawn_forwarder(rx, Arc::clone(&controller) as _, events_tx);

        // Act – enqueue a press/release pair for one key, then tear down.
        tx.send(intent(17, RelayDirection::Press)).await.expect("send");
        tx.send(intent(17, RelayDirection::Release)).await.expect("send");
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("forwarder must exit")
            .expect("forwarder must not panic");

        // Give the spawned workers a moment to finish.
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Assert – both events relayed, press before release.
        let sent = controller.sent_snapshot();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].direction, RelayDirection::Press);
        assert_eq!(sent[1].direction, RelayDirection::Release);

        // Completion events published for both.
        let mut completed = 0;
        while let Ok(event) = events_rx.try_recv() {
            if matches!(event, EngineEvent::RelayCompleted { .. }) {
                completed += 1;
            }
        }
        assert_eq!(completed, 2);
    }

    #[tokio::test]
    async fn test_failed_relay_publishes_failure_and_continues() {
        // Arrange
        let controller = Arc::new(RecordingGuestController::new());
        controller.set_fail_sends(true);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::channel(RELAY_QUEUE_DEPTH);
        let handle = spawn_forwarder(rx, Arc::clone(&controller) as _, events_tx);

        // Act
        tx.send(intent(32, RelayDirection::Press)).await.expect("send");
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("forwarder must exit")
            .expect("forwarder must not panic");
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Assert – nothing recorded, a RelayFailed event published, and no
        // retry happened (the controller saw exactly one attempt).
        assert!(controller.sent_snapshot().is_empty());
        let failed = std::iter::from_fn(|| events_rx.try_recv().ok())
            .filter(|e| matches!(e, EngineEvent::RelayFailed { .. }))
            .count();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_same_key_press_precedes_release_under_concurrency() {
        // Arrange – many keys interleaved; each key's press is enqueued
        // before its release, and that order must survive the 2-wide pool.
        let controller = Arc::new(RecordingGuestController::new());
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::channel(RELAY_QUEUE_DEPTH);
        let handle = spawn_forwarder(rx, Arc::clone(&controller) as _, events_tx);

        // Act
        for scan in [17, 32, 57, 77] {
            tx.send(intent(scan, RelayDirection::Press)).await.expect("send");
            tx.send(intent(scan, RelayDirection::Release)).await.expect("send");
        }
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("forwarder must exit")
            .expect("forwarder must not panic");
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Assert – per key, press is invoked before release.
        let sent = controller.sent_snapshot();
        assert_eq!(sent.len(), 8);
        for scan in [17, 32, 57, 77] {
            let press_idx = sent
                .iter()
                .position(|i| i.scan_code == scan && i.direction == RelayDirection::Press)
                .expect("press recorded");
            let release_idx = sent
                .iter()
                .position(|i| i.scan_code == scan && i.direction == RelayDirection::Release)
                .expect("release recorded");
            assert!(press_idx < release_idx, "scan {scan} release overtook press");
        }
    }
}
