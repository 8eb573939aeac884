//! Host event correlation: decide block vs pass.
//!
//! The host tap cannot tell which device produced an event, so provenance
//! is inferred by correlating the tap's stream against the device stream's
//! keystrokes.  The correlator is the only component that sees both
//! streams and the only shared mutable state in a session.
//!
//! # Concurrency
//!
//! [`Correlator::record`] runs on the HID dispatch thread; the decision
//! functions run on the tap dispatch thread; the janitor takes the same
//! lock from its own task.  All critical sections are single map
//! operations, so contention is bounded by human typing rates.  No strict
//! ordering exists between the HID and tap callbacks for the same key —
//! either can fire first — and the decision rules are written to produce
//! the right answer under both orderings.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use keyrelay_core::{KeyDirection, Keystroke};
use tracing::{debug, warn};

/// Window in which a host Down with no held-key record is attributed to a
/// fresh HID Down from the selected device.
///
/// Must cover the scheduling jitter between the HID callback and the tap
/// callback.  30 ms proved too tight on a loaded machine; 80 ms has held
/// up in practice.
pub const DEFAULT_INITIAL_WINDOW: Duration = Duration::from_millis(80);

/// A held key with no HID Down newer than this is stale: the Up was lost
/// somewhere, and continuing to block would swallow another keyboard's key.
pub const DEFAULT_HOLD_TTL: Duration = Duration::from_secs(10);

/// Cadence of the janitor sweep.
pub const DEFAULT_JANITOR_PERIOD: Duration = Duration::from_secs(5);

/// Age past which the janitor prunes a timestamp entry.
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(30);

/// Hard cap on each timestamp map; oldest entries are evicted beyond it.
pub const DEFAULT_MAP_CAP: usize = 50;

/// Verdict of a decision function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Block,
    Pass,
}

/// Timing knobs, normally taken from the config file.
#[derive(Debug, Clone)]
pub struct CorrelatorTuning {
    pub initial_window: Duration,
    pub hold_ttl: Duration,
    pub entry_ttl: Duration,
    pub map_cap: usize,
}

impl Default for CorrelatorTuning {
    fn default() -> Self {
        Self {
            initial_window: DEFAULT_INITIAL_WINDOW,
            hold_ttl: DEFAULT_HOLD_TTL,
            entry_ttl: DEFAULT_ENTRY_TTL,
            map_cap: DEFAULT_MAP_CAP,
        }
    }
}

#[derive(Default)]
struct CorrelatorState {
    /// Keys whose last device-stream transition was Down and whose release
    /// has not yet been consumed.
    pressed: HashSet<i32>,
    last_hid_down: HashMap<i32, Instant>,
    last_hid_up: HashMap<i32, Instant>,
}

/// Shared correlation state plus the two decision functions.
pub struct Correlator {
    tuning: CorrelatorTuning,
    state: Mutex<CorrelatorState>,
}

impl Correlator {
    pub fn new(tuning: CorrelatorTuning) -> Self {
        Self {
            tuning,
            state: Mutex::new(CorrelatorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CorrelatorState> {
        // A poisoned lock means a panic on a callback thread; the maps are
        // still structurally sound, so keep serving decisions.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records a device-stream keystroke.  Called from the HID thread
    /// before the matching relay intent is enqueued, which is what keeps a
    /// key's press ahead of its release in the relay queue.
    pub fn record(&self, keystroke: &Keystroke) {
        let mut st = self.lock();
        match keystroke.direction {
            KeyDirection::Down => {
                st.pressed.insert(keystroke.key_code);
                st.last_hid_down.insert(keystroke.key_code, keystroke.at);
            }
            KeyDirection::Up => {
                st.pressed.remove(&keystroke.key_code);
                st.last_hid_up.insert(keystroke.key_code, keystroke.at);
            }
        }
    }

    /// Decides a host key-down at time `at`.
    ///
    /// A held key blocks (host auto-repeats for the captured key must not
    /// leak) unless its record is stale, in which case the state
    /// self-heals and the event passes.  A key not held blocks only when a
    /// HID Down from the selected device landed within the initial
    /// window; anything else is another keyboard's keystroke.
    pub fn should_block_down(&self, key_code: i32, at: Instant) -> Decision {
        let mut st = self.lock();

        if st.pressed.contains(&key_code) {
            return match st.last_hid_down.get(&key_code).copied() {
                Some(down) if at.saturating_duration_since(down) <= self.tuning.hold_ttl => {
                    Decision::Block
                }
                _ => {
                    // Stale correlation: no recent HID evidence for this
                    // held key.  Heal and let the event through.
                    st.pressed.remove(&key_code);
                    warn!(key_code, "stale held key healed, passing host event");
                    Decision::Pass
                }
            };
        }

        match st.last_hid_down.get(&key_code).copied() {
            Some(down) if at.saturating_duration_since(down) <= self.tuning.initial_window => {
                st.pressed.insert(key_code);
                Decision::Block
            }
            _ => Decision::Pass,
        }
    }

    /// Decides a host key-up.
    ///
    /// Releases are trusted against `pressed` alone: the host Up can beat
    /// the HID-reported Up, and waiting for corroboration would leak the
    /// release to the host.
    pub fn should_block_up(&self, key_code: i32) -> Decision {
        let mut st = self.lock();
        if st.pressed.remove(&key_code) {
            Decision::Block
        } else {
            Decision::Pass
        }
    }

    /// Janitor sweep: prunes timestamp entries older than the entry TTL
    /// and enforces the map cap.  Returns how many entries were removed.
    pub fn prune(&self, now: Instant) -> usize {
        let mut st = self.lock();
        let ttl = self.tuning.entry_ttl;
        let cap = self.tuning.map_cap;
        let before = st.last_hid_down.len() + st.last_hid_up.len();

        st.last_hid_down
            .retain(|_, t| now.saturating_duration_since(*t) <= ttl);
        st.last_hid_up
            .retain(|_, t| now.saturating_duration_since(*t) <= ttl);
        evict_oldest_beyond(&mut st.last_hid_down, cap);
        evict_oldest_beyond(&mut st.last_hid_up, cap);

        let removed = before - (st.last_hid_down.len() + st.last_hid_up.len());
        if removed > 0 {
            debug!(removed, "janitor pruned correlation entries");
        }
        removed
    }

    /// Clears all state at session end.
    pub fn drain(&self) {
        let mut st = self.lock();
        st.pressed.clear();
        st.last_hid_down.clear();
        st.last_hid_up.clear();
    }

    /// Number of keys currently held, for status and tests.
    pub fn pressed_len(&self) -> usize {
        self.lock().pressed.len()
    }

    /// Sizes of the two timestamp maps, for tests.
    pub fn map_lens(&self) -> (usize, usize) {
        let st = self.lock();
        (st.last_hid_down.len(), st.last_hid_up.len())
    }
}

/// Removes oldest entries until `map` holds at most `cap`.
fn evict_oldest_beyond(map: &mut HashMap<i32, Instant>, cap: usize) {
    while map.len() > cap {
        let oldest = map
            .iter()
            .min_by_key(|(_, t)| **t)
            .map(|(k, _)| *k);
        match oldest {
            Some(k) => {
                map.remove(&k);
            }
            None => break,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
