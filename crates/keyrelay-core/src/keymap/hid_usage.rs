//! HID usage (keyboard/keypad page 0x07) to internal key code table.
//!
//! The internal numbering is the macOS virtual key space (`Events.h`,
//! HIToolbox): 'A' is 0, Space is 49, Right-arrow is 124.  HID usages are
//! position codes starting at 0x04 for 'A'; the two numberings share no
//! arithmetic relationship, hence the explicit table.
//!
//! Reference: USB HID Usage Tables 1.3, Section 10.

use tracing::warn;

/// Translates a HID keyboard/keypad usage to an internal key code.
///
/// Unmapped usages at or below 127 identity-map with a warning (uncommon
/// but legitimate keys keep working); unmapped usages above 127 return
/// `None` and are dropped by the caller.
pub fn usage_to_key_code(usage: u32) -> Option<i32> {
    let code = match usage {
        // Letters (HID 0x04–0x1D)
        0x04 => 0,   // A
        0x05 => 11,  // B
        0x06 => 8,   // C
        0x07 => 2,   // D
        0x08 => 14,  // E
        0x09 => 3,   // F
        0x0A => 5,   // G
        0x0B => 4,   // H
        0x0C => 34,  // I
        0x0D => 38,  // J
        0x0E => 40,  // K
        0x0F => 37,  // L
        0x10 => 46,  // M
        0x11 => 45,  // N
        0x12 => 31,  // O
        0x13 => 35,  // P
        0x14 => 12,  // Q
        0x15 => 15,  // R
        0x16 => 1,   // S
        0x17 => 17,  // T
        0x18 => 32,  // U
        0x19 => 9,   // V
        0x1A => 13,  // W
        0x1B => 7,   // X
        0x1C => 16,  // Y
        0x1D => 6,   // Z

        // Digits (HID 0x1E–0x27)
        0x1E => 18, // 1
        0x1F => 19, // 2
        0x20 => 20, // 3
        0x21 => 21, // 4
        0x22 => 23, // 5
        0x23 => 22, // 6
        0x24 => 26, // 7
        0x25 => 28, // 8
        0x26 => 25, // 9
        0x27 => 29, // 0

        // Control and punctuation (HID 0x28–0x38)
        0x28 => 36, // Return
        0x29 => 53, // Escape
        0x2A => 51, // Backspace
        0x2B => 48, // Tab
        0x2C => 49, // Space
        0x2D => 27, // Minus
        0x2E => 24, // Equal
        0x2F => 33, // LeftBracket
        0x30 => 30, // RightBracket
        0x31 => 42, // Backslash
        0x33 => 41, // Semicolon
        0x34 => 39, // Quote
        0x35 => 50, // Grave
        0x36 => 43, // Comma
        0x37 => 47, // Period
        0x38 => 44, // Slash

        0x39 => 57, // CapsLock

        // Function keys (HID 0x3A–0x45)
        0x3A => 122, // F1
        0x3B => 120, // F2
        0x3C => 99,  // F3
        0x3D => 118, // F4
        0x3E => 96,  // F5
        0x3F => 97,  // F6
        0x40 => 98,  // F7
        0x41 => 100, // F8
        0x42 => 101, // F9
        0x43 => 109, // F10
        0x44 => 103, // F11
        0x45 => 111, // F12

        // Navigation cluster (HID 0x46–0x52)
        0x46 => 105, // PrintScreen (F13 position)
        0x47 => 107, // ScrollLock (F14 position)
        0x48 => 113, // Pause (F15 position)
        0x49 => 114, // Insert (Help)
        0x4A => 115, // Home
        0x4B => 116, // PageUp
        0x4C => 117, // ForwardDelete
        0x4D => 119, // End
        0x4E => 121, // PageDown
        0x4F => 124, // ArrowRight
        0x50 => 123, // ArrowLeft
        0x51 => 125, // ArrowDown
        0x52 => 126, // ArrowUp

        // Keypad (HID 0x53–0x63)
        0x53 => 71, // NumLock (keypad Clear)
        0x54 => 75, // KeypadDivide
        0x55 => 67, // KeypadMultiply
        0x56 => 78, // KeypadSubtract
        0x57 => 69, // KeypadAdd
        0x58 => 76, // KeypadEnter
        0x59 => 83, // Keypad1
        0x5A => 84, // Keypad2
        0x5B => 85, // Keypad3
        0x5C => 86, // Keypad4
        0x5D => 87, // Keypad5
        0x5E => 88, // Keypad6
        0x5F => 89, // Keypad7
        0x60 => 91, // Keypad8
        0x61 => 92, // Keypad9
        0x62 => 82, // Keypad0
        0x63 => 65, // KeypadDecimal

        // Modifiers (HID 0xE0–0xE7)
        0xE0 => 59, // ControlLeft
        0xE1 => 56, // ShiftLeft
        0xE2 => 58, // OptionLeft
        0xE3 => 55, // CommandLeft
        0xE4 => 62, // ControlRight
        0xE5 => 60, // ShiftRight
        0xE6 => 61, // OptionRight
        0xE7 => 54, // CommandRight

        other if other <= 127 => {
            warn!(usage = other, "unmapped HID usage, identity-mapping");
            other as i32
        }
        other => {
            warn!(usage = other, "unmapped HID usage above 127, dropping");
            return None;
        }
    };
    Some(code)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_26_letters_map_and_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for usage in 0x04u32..=0x1D {
            let code = usage_to_key_code(usage).expect("letter must map");
            assert!(seen.insert(code), "duplicate key code for usage 0x{usage:02X}");
        }
        assert_eq!(seen.len(), 26);
    }

    #[test]
    fn test_all_digits_map_and_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for usage in 0x1Eu32..=0x27 {
            let code = usage_to_key_code(usage).expect("digit must map");
            assert!(seen.insert(code));
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn test_function_keys_map_to_expected_codes() {
        assert_eq!(usage_to_key_code(0x3A), Some(122)); // F1
        assert_eq!(usage_to_key_code(0x45), Some(111)); // F12
    }

    #[test]
    fn test_modifiers_map_above_identity_range() {
        assert_eq!(usage_to_key_code(0xE0), Some(59)); // left control
        assert_eq!(usage_to_key_code(0xE3), Some(55)); // left command
        assert_eq!(usage_to_key_code(0xE7), Some(54)); // right command
    }

    #[test]
    fn test_forward_delete_maps() {
        assert_eq!(usage_to_key_code(0x4C), Some(117));
    }

    #[test]
    fn test_unassigned_high_usage_drops() {
        assert_eq!(usage_to_key_code(0x100), None);
        assert_eq!(usage_to_key_code(0xE8), None);
    }
}
