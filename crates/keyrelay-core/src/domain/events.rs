//! Keystroke and relay event value types.
//!
//! All timestamps are monotonic [`Instant`]s.  Staleness checks against
//! `HOLD_TTL` and `INITIAL_WINDOW` must never use calendar time: a wall
//! clock adjustment mid-session would spuriously expire or revive held
//! keys.

use std::time::Instant;

use uuid::Uuid;

/// Direction of a key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDirection {
    Down,
    Up,
}

/// A key transition derived from the selected device's HID state reports.
///
/// Produced by the device stream's transition filter, so consecutive
/// identical state reports never yield duplicate keystrokes.
#[derive(Debug, Clone)]
pub struct Keystroke {
    /// Internal key code (macOS virtual key numbering).
    pub key_code: i32,
    pub direction: KeyDirection,
    pub at: Instant,
    /// `device_key` of the reporting interface.
    pub source_device_key: String,
}

/// A key event observed at the host dispatch point.
///
/// The host API does not expose the originating device, which is why the
/// correlator exists: provenance has to be inferred from timing against the
/// device stream.
#[derive(Debug, Clone, Copy)]
pub struct HostEvent {
    pub key_code: i32,
    pub direction: KeyDirection,
    pub at: Instant,
}

/// Direction of a relayed key event, in the controller's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDirection {
    Press,
    Release,
}

impl RelayDirection {
    /// The exact `--event` argument string the hypervisor controller expects.
    pub fn as_controller_arg(self) -> &'static str {
        match self {
            RelayDirection::Press => "press",
            RelayDirection::Release => "release",
        }
    }
}

impl From<KeyDirection> for RelayDirection {
    fn from(d: KeyDirection) -> Self {
        match d {
            KeyDirection::Down => RelayDirection::Press,
            KeyDirection::Up => RelayDirection::Release,
        }
    }
}

/// One key event to forward to a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayIntent {
    /// Guest scan code (physical-QWERTY position, decimal on the wire).
    pub scan_code: i32,
    pub direction: RelayDirection,
    pub target: Uuid,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_direction_controller_args_are_exact() {
        // The controller CLI matches these strings literally.
        assert_eq!(RelayDirection::Press.as_controller_arg(), "press");
        assert_eq!(RelayDirection::Release.as_controller_arg(), "release");
    }

    #[test]
    fn test_key_direction_converts_to_relay_direction() {
        assert_eq!(RelayDirection::from(KeyDirection::Down), RelayDirection::Press);
        assert_eq!(RelayDirection::from(KeyDirection::Up), RelayDirection::Release);
    }
}
