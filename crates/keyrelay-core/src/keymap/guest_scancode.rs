//! Internal key code to guest scan code table.
//!
//! The guest consumes PC set-1 scan codes, which identify the **physical
//! QWERTY position** of a key.  The internal (macOS virtual key) numbering
//! is unrelated to that layout — 'A' is 0 internally but sits at scan
//! position 30 — so every entry here is an explicit physical-position
//! fact, not something derivable by arithmetic.
//!
//! Domain: letters, digits, punctuation, Return, Escape, Backspace, Tab,
//! Space, brackets, CapsLock, arrows, F1–F12, ForwardDelete.  Scan codes
//! are sent to the controller in decimal.

use tracing::warn;

/// Scan code substituted on a table miss, the position of 'A'.
const FALLBACK_SCAN_CODE: i32 = 30;

/// Translates an internal key code to the guest scan code.
///
/// A miss substitutes the scan code of 'A' with a warning rather than
/// dropping the relay: a wrong letter on the guest is diagnosable, a
/// silently missing keystroke is not.
pub fn key_code_to_scan_code(key_code: i32) -> i32 {
    match key_code {
        // Letter row positions
        0 => 30,  // A
        1 => 31,  // S
        2 => 32,  // D
        3 => 33,  // F
        4 => 35,  // H
        5 => 34,  // G
        6 => 44,  // Z
        7 => 45,  // X
        8 => 46,  // C
        9 => 47,  // V
        11 => 48, // B
        12 => 16, // Q
        13 => 17, // W
        14 => 18, // E
        15 => 19, // R
        16 => 21, // Y
        17 => 20, // T

        // Number row
        18 => 2,  // 1
        19 => 3,  // 2
        20 => 4,  // 3
        21 => 5,  // 4
        22 => 7,  // 6
        23 => 6,  // 5
        24 => 13, // =
        25 => 10, // 9
        26 => 8,  // 7
        27 => 12, // -
        28 => 9,  // 8
        29 => 11, // 0

        30 => 27, // ]
        31 => 24, // O
        32 => 22, // U
        33 => 26, // [
        34 => 23, // I
        35 => 25, // P
        36 => 28, // Return
        37 => 38, // L
        38 => 36, // J
        39 => 40, // '
        40 => 37, // K
        41 => 39, // ;
        42 => 43, // backslash
        43 => 51, // ,
        44 => 53, // /
        45 => 49, // N
        46 => 50, // M
        47 => 52, // .
        48 => 15, // Tab
        49 => 57, // Space
        50 => 41, // `
        51 => 14, // Backspace
        53 => 1,  // Escape
        57 => 58, // CapsLock

        // Function row
        122 => 59, // F1
        120 => 60, // F2
        99 => 61,  // F3
        118 => 62, // F4
        96 => 63,  // F5
        97 => 64,  // F6
        98 => 65,  // F7
        100 => 66, // F8
        101 => 67, // F9
        109 => 68, // F10
        103 => 87, // F11
        111 => 88, // F12

        117 => 83, // ForwardDelete

        // Arrows
        123 => 75, // Left
        124 => 77, // Right
        125 => 80, // Down
        126 => 72, // Up

        other => {
            warn!(
                key_code = other,
                fallback = FALLBACK_SCAN_CODE,
                "no guest scan code for key code, substituting 'A'"
            );
            FALLBACK_SCAN_CODE
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
