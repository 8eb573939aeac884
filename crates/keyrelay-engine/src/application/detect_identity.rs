//! Identity detection: figure out which physical keyboard the user is
//! typing on.
//!
//! A read-only listener is opened across all keyboards.  Every press
//! (value > 0, rollover filtered) contributes evidence: the reporting
//! interface's `device_key` and derived `physical_id`.  When the
//! caller-supplied stop predicate fires, the evidence is correlated with
//! the enumeration snapshot:
//!
//! 1. exact `device_key` match, then
//! 2. `physical_id` match — which is how evidence observed on one
//!    interface recovers *all* interfaces (wired and wireless) of the same
//!    physical keyboard.
//!
//! The selection must share one physical id; if presses were seen from
//! several physical keyboards, the one with the most presses wins.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use keyrelay_core::{Device, Selection, ROLLOVER_SENTINEL};
use tracing::{debug, info};

use crate::infrastructure::hid::{HidError, HidSource, KEY_USAGE_PAGE};

/// How often the listener loop wakes to re-check the stop predicate when
/// no presses are arriving (covers the "operator stop" predicate).
const PREDICATE_POLL: Duration = Duration::from_millis(100);

/// Error type for identity detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// Presses were observed (or detection was stopped) but nothing could
    /// be matched against the enumerated keyboards — typically a stale
    /// enumeration snapshot.  Recoverable by refreshing and re-correlating.
    #[error("observed keystrokes could not be matched to any enumerated keyboard")]
    NoMatch,
    #[error(transparent)]
    Hid(#[from] HidError),
}

/// Progress handed to the stop predicate on every press and on every poll
/// tick.
#[derive(Debug, Clone)]
pub struct DetectionProgress {
    /// Total presses observed so far.
    pub presses: u32,
    /// Number of distinct reporting interfaces seen.
    pub distinct_interfaces: usize,
    /// When the listener was opened.
    pub started_at: Instant,
}

/// Caller-supplied stop condition; detection never hard-codes a press count.
pub type StopPredicate = Box<dyn FnMut(&DetectionProgress) -> bool + Send>;

/// Returns a predicate that stops after `n` observed presses.
pub fn stop_after_presses(n: u32) -> StopPredicate {
    Box::new(move |p: &DetectionProgress| p.presses >= n)
}

/// Raw press evidence collected by [`observe_presses`].
#[derive(Debug, Clone, Default)]
pub struct ObservedEvidence {
    /// Press count per reporting interface, with the derived physical id.
    interfaces: HashMap<String, (String, u32)>,
}

impl ObservedEvidence {
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// The physical id with the most presses, if any evidence exists.
    fn dominant_physical_id(&self) -> Option<String> {
        let mut per_phys: HashMap<&str, u32> = HashMap::new();
        for (phys, count) in self.interfaces.values() {
            *per_phys.entry(phys.as_str()).or_insert(0) += count;
        }
        per_phys
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(phys, _)| phys.to_string())
    }

    #[cfg(test)]
    pub fn record_for_test(&mut self, device_key: &str, physical_id: &str, presses: u32) {
        self.interfaces
            .insert(device_key.to_string(), (physical_id.to_string(), presses));
    }
}

/// Listens across all keyboards until the stop predicate fires and returns
/// the collected press evidence.
pub fn observe_presses(
    source: &dyn HidSource,
    mut stop: StopPredicate,
) -> Result<ObservedEvidence, DetectError> {
    let rx = source.start()?;
    let started_at = Instant::now();
    let mut evidence = ObservedEvidence::default();
    let mut presses = 0u32;

    loop {
        let progress = DetectionProgress {
            presses,
            distinct_interfaces: evidence.interfaces.len(),
            started_at,
        };
        if stop(&progress) {
            break;
        }

        match rx.recv_timeout(PREDICATE_POLL) {
            Ok(report) => {
                if report.usage_page != KEY_USAGE_PAGE
                    || report.usage == ROLLOVER_SENTINEL
                    || report.value <= 0
                {
                    continue;
                }
                presses += 1;
                let entry = evidence
                    .interfaces
                    .entry(report.device_key())
                    .or_insert_with(|| (report.physical_id(), 0));
                entry.1 += 1;
                debug!(
                    device_key = %report.device_key(),
                    presses,
                    "identity press observed"
                );
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    source.stop();
    Ok(evidence)
}

/// Correlates press evidence with an enumeration snapshot.
///
/// Interfaces matched by exact `device_key` come first, then any further
/// interface sharing the dominant physical id; [`Selection::new`]
/// deduplicates on `(physical_id, transport)`.
pub fn correlate_evidence(
    evidence: &ObservedEvidence,
    available: &[Device],
) -> Result<Selection, DetectError> {
    let dominant = match evidence.dominant_physical_id() {
        Some(p) => p,
        None => return Err(DetectError::NoMatch),
    };

    let mut matched: Vec<Device> = Vec::new();

    // 1. Exact interface matches within the dominant physical unit.
    for device in available {
        if let Some((phys, _)) = evidence.interfaces.get(&device.device_key) {
            if *phys == dominant {
                matched.push(device.clone());
            }
        }
    }

    // 2. Remaining interfaces of the same physical unit: recovered purely
    //    by id, since evidence may have been seen on only one of them.
    for device in available {
        if device.physical_id == dominant
            && !matched.iter().any(|m| m.device_key == device.device_key)
        {
            matched.push(device.clone());
        }
    }

    // Every matched device shares the dominant physical id, so selection
    // construction cannot mix units; treat a mismatch as uncorrelatable.
    let selection = Selection::new(matched).map_err(|_| DetectError::NoMatch)?;
    if selection.is_empty() {
        return Err(DetectError::NoMatch);
    }
    info!(
        physical_id = %dominant,
        interfaces = selection.devices().len(),
        device_name = selection.display_name(),
        "identity detected"
    );
    Ok(selection)
}

/// Full detection: observe presses, then correlate against `available`.
pub fn detect_identity(
    source: &dyn HidSource,
    available: &[Device],
    stop: StopPredicate,
) -> Result<Selection, DetectError> {
    let evidence = observe_presses(source, stop)?;
    correlate_evidence(&evidence, available)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::hid::mock::MockHidSource;
    use keyrelay_core::Transport;

    fn dev(vendor: u32, product: u32, location: u32, transport: Transport) -> Device {
        Device::new(vendor, product, location, transport, "kbd", "acme")
    }

    #[test]
    fn test_detection_recovers_both_interfaces_from_one() {
        // Available: physical P over USB and Bluetooth, physical Q over USB.
        let p_usb = dev(0x5ac, 0x24f, 0x14100012, Transport::Usb);
        let p_bt = dev(0x5ac, 0x24f, 0x141000a0, Transport::Bluetooth);
        let q_usb = dev(0x46d, 0xc31c, 0x00300000, Transport::Usb);
        let available = vec![p_usb.clone(), p_bt.clone(), q_usb.clone()];

        let source = MockHidSource::new(available.clone());

        // Three presses observed only via P's USB interface.
        let src_ref = &source;
        std::thread::scope(|scope| {
            scope.spawn(move || {
                // Wait for the listener to open, then type three presses.
                while !src_ref.listening() {
                    std::thread::yield_now();
                }
                for _ in 0..3 {
                    src_ref.inject_key(&p_usb, 0x04, 1, Instant::now());
                    src_ref.inject_key(&p_usb, 0x04, 0, Instant::now());
                }
            });

            // Act
            let selection = detect_identity(src_ref, &available, stop_after_presses(3))
                .expect("detection must succeed");

            // Assert – both interfaces of P, not Q.
            assert_eq!(selection.devices().len(), 2);
            assert!(selection.contains_device_key(&available[0].device_key));
            assert!(selection.contains_device_key(&available[1].device_key));
            assert!(!selection.contains_device_key(&q_usb.device_key));
        });
    }

    #[test]
    fn test_releases_and_rollover_do_not_count_as_presses() {
        let kbd = dev(0x5ac, 0x24f, 0x14100012, Transport::Usb);
        let available = vec![kbd.clone()];
        let source = MockHidSource::new(available.clone());

        let src_ref = &source;
        std::thread::scope(|scope| {
            scope.spawn(move || {
                while !src_ref.listening() {
                    std::thread::yield_now();
                }
                // Two releases and a rollover: zero presses.
                src_ref.inject_key(&kbd, 0x04, 0, Instant::now());
                src_ref.inject_key(&kbd, ROLLOVER_SENTINEL, 1, Instant::now());
                src_ref.inject_key(&kbd, 0x05, 0, Instant::now());
                // Then one real press, which satisfies the predicate.
                src_ref.inject_key(&kbd, 0x06, 1, Instant::now());
            });

            let selection = detect_identity(src_ref, &available, stop_after_presses(1))
                .expect("detection must succeed");
            assert_eq!(selection.devices().len(), 1);
        });
    }

    #[test]
    fn test_correlate_unmatched_evidence_is_no_match() {
        // Evidence points at a keyboard missing from the (stale) snapshot.
        let mut evidence = ObservedEvidence::default();
        evidence.record_for_test("1111:2222:00000100", "1111-2222-1", 3);

        let available = vec![dev(0x5ac, 0x24f, 0x14100012, Transport::Usb)];

        let result = correlate_evidence(&evidence, &available);
        assert!(matches!(result, Err(DetectError::NoMatch)));
    }

    #[test]
    fn test_correlate_empty_evidence_is_no_match() {
        let evidence = ObservedEvidence::default();
        let available = vec![dev(0x5ac, 0x24f, 0x14100012, Transport::Usb)];

        let result = correlate_evidence(&evidence, &available);
        assert!(matches!(result, Err(DetectError::NoMatch)));
    }

    #[test]
    fn test_dominant_physical_keyboard_wins() {
        // Presses from two physical keyboards: the one typed on more wins.
        let p = dev(0x5ac, 0x24f, 0x14100012, Transport::Usb);
        let q = dev(0x46d, 0xc31c, 0x00300000, Transport::Usb);

        let mut evidence = ObservedEvidence::default();
        evidence.record_for_test(&p.device_key, &p.physical_id, 1);
        evidence.record_for_test(&q.device_key, &q.physical_id, 5);

        let selection = correlate_evidence(&evidence, &[p.clone(), q.clone()])
            .expect("correlation must succeed");

        assert_eq!(selection.physical_id(), Some(q.physical_id.as_str()));
        assert!(!selection.contains_device_key(&p.device_key));
    }

    #[test]
    fn test_correlation_matches_by_physical_id_when_device_key_differs() {
        // Evidence from an interface whose exact key is not enumerated
        // (e.g. the registry re-assigned the low location byte), but whose
        // physical id matches.
        let enumerated = dev(0x5ac, 0x24f, 0x14100012, Transport::Usb);
        let mut evidence = ObservedEvidence::default();
        evidence.record_for_test(
            "05ac:024f:141000ff",
            &Device::physical_id_for(0x5ac, 0x24f, 0x141000ff),
            2,
        );

        let selection = correlate_evidence(&evidence, &[enumerated.clone()])
            .expect("physical id match must succeed");
        assert!(selection.contains_device_key(&enumerated.device_key));
    }
}
