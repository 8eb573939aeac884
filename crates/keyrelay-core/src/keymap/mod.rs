//! Key code translation tables.
//!
//! Three pure tables sit on the per-keystroke hot path:
//!
//! 1. **HID usage → internal key code** ([`hid_usage`]).  Raw usages from
//!    the keyboard/keypad usage page become the virtual key numbering used
//!    everywhere inside the engine.
//! 2. **internal key code → human name** ([`key_names`]).  For logs and
//!    status display only; never fed back into dispatch.
//! 3. **internal key code → guest scan code** ([`guest_scancode`]).  The
//!    value handed to the hypervisor controller.  Scan codes identify the
//!    **physical QWERTY position** of the key (PC set 1), not anything
//!    derivable from the internal code's numeric order.
//!
//! All three are total functions with documented fallbacks; a relayed key
//! event is never silently dropped on a table miss.

pub mod guest_scancode;
pub mod hid_usage;
pub mod key_names;

/// All-ones usage value reported when too many keys are held at once.
///
/// Filtered before mapping at both the identity detector and the device
/// stream; it never reaches a translation table or emits a keystroke.
pub const ROLLOVER_SENTINEL: u32 = u32::MAX;

/// Unified mapper providing all translation directions.
pub struct KeyMapper;

impl KeyMapper {
    /// Translates a HID keyboard/keypad usage to an internal key code.
    ///
    /// Returns `None` for the rollover sentinel and for unmapped usages
    /// above 127; unmapped usages at or below 127 identity-map with a
    /// warning so an unusual but valid key still round-trips.
    pub fn usage_to_key_code(usage: u32) -> Option<i32> {
        if usage == ROLLOVER_SENTINEL {
            return None;
        }
        hid_usage::usage_to_key_code(usage)
    }

    /// Human-readable name for an internal key code (`Key<n>` on a miss).
    pub fn key_code_to_name(key_code: i32) -> String {
        key_names::key_code_to_name(key_code)
    }

    /// Guest scan code (physical-QWERTY position) for an internal key code.
    ///
    /// Falls back to the scan code of 'A' (30) with a warning on a miss.
    pub fn key_code_to_scan_code(key_code: i32) -> i32 {
        guest_scancode::key_code_to_scan_code(key_code)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
