//! Internal key code to human-readable key name.
//!
//! Used for the keystroke log and status display.  Names are never parsed
//! back; the fallback `Key<n>` keeps unknown codes distinguishable.

/// Returns the display name for an internal key code.
pub fn key_code_to_name(key_code: i32) -> String {
    let name = match key_code {
        0 => "A",
        1 => "S",
        2 => "D",
        3 => "F",
        4 => "H",
        5 => "G",
        6 => "Z",
        7 => "X",
        8 => "C",
        9 => "V",
        11 => "B",
        12 => "Q",
        13 => "W",
        14 => "E",
        15 => "R",
        16 => "Y",
        17 => "T",
        18 => "1",
        19 => "2",
        20 => "3",
        21 => "4",
        22 => "6",
        23 => "5",
        24 => "=",
        25 => "9",
        26 => "7",
        27 => "-",
        28 => "8",
        29 => "0",
        30 => "]",
        31 => "O",
        32 => "U",
        33 => "[",
        34 => "I",
        35 => "P",
        36 => "Return",
        37 => "L",
        38 => "J",
        39 => "'",
        40 => "K",
        41 => ";",
        42 => "\\",
        43 => ",",
        44 => "/",
        45 => "N",
        46 => "M",
        47 => ".",
        48 => "Tab",
        49 => "Space",
        50 => "`",
        51 => "Delete",
        53 => "Escape",
        54 => "RightCommand",
        55 => "Command",
        56 => "Shift",
        57 => "CapsLock",
        58 => "Option",
        59 => "Control",
        60 => "RightShift",
        61 => "RightOption",
        62 => "RightControl",
        65 => "KeypadDecimal",
        67 => "KeypadMultiply",
        69 => "KeypadPlus",
        71 => "NumLock",
        75 => "KeypadDivide",
        76 => "KeypadEnter",
        78 => "KeypadMinus",
        82 => "Keypad0",
        83 => "Keypad1",
        84 => "Keypad2",
        85 => "Keypad3",
        86 => "Keypad4",
        87 => "Keypad5",
        88 => "Keypad6",
        89 => "Keypad7",
        91 => "Keypad8",
        92 => "Keypad9",
        96 => "F5",
        97 => "F6",
        98 => "F7",
        99 => "F3",
        100 => "F8",
        101 => "F9",
        103 => "F11",
        105 => "F13",
        107 => "F14",
        109 => "F10",
        111 => "F12",
        113 => "F15",
        114 => "Help",
        115 => "Home",
        116 => "PageUp",
        117 => "ForwardDelete",
        118 => "F4",
        119 => "End",
        120 => "F2",
        121 => "PageDown",
        122 => "F1",
        123 => "LeftArrow",
        124 => "RightArrow",
        125 => "DownArrow",
        126 => "UpArrow",
        other => return format!("Key{other}"),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_and_named_keys() {
        assert_eq!(key_code_to_name(13), "W");
        assert_eq!(key_code_to_name(36), "Return");
        assert_eq!(key_code_to_name(49), "Space");
        assert_eq!(key_code_to_name(53), "Escape");
        assert_eq!(key_code_to_name(57), "CapsLock");
        assert_eq!(key_code_to_name(124), "RightArrow");
    }

    #[test]
    fn test_unknown_code_formats_as_key_n() {
        assert_eq!(key_code_to_name(10), "Key10");
        assert_eq!(key_code_to_name(-1), "Key-1");
        assert_eq!(key_code_to_name(500), "Key500");
    }
}
