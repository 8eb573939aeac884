//! Per-session device stream: raw HID values → key transitions.
//!
//! HID keyboards send periodic full state reports, so the same key value
//! arrives over and over while nothing changes.  The stream keeps the
//! previous value per key and emits a keystroke only on an actual
//! transition; without this filter every report of a held key would look
//! like a fresh press.
//!
//! The registry delivers values for every matched interface through one
//! callback, so the stream also drops values whose reporting interface is
//! not part of the session's selection.

use std::collections::{HashMap, HashSet};

use keyrelay_core::{KeyDirection, KeyMapper, Keystroke, Selection, ROLLOVER_SENTINEL};

use crate::infrastructure::hid::{HidKeyValue, KEY_USAGE_PAGE};

/// Stateful transition filter for one session.
pub struct DeviceStream {
    selection_keys: HashSet<String>,
    prev_state: HashMap<i32, bool>,
}

impl DeviceStream {
    pub fn new(selection: &Selection) -> Self {
        Self {
            selection_keys: selection
                .devices()
                .iter()
                .map(|d| d.device_key.clone())
                .collect(),
            prev_state: HashMap::new(),
        }
    }

    /// Feeds one raw value report; returns a keystroke on a transition.
    ///
    /// Filters, in order: usage page, rollover sentinel, reporting
    /// interface, unmapped usage.  Steady-state reports return `None`.
    pub fn accept(&mut self, report: &HidKeyValue) -> Option<Keystroke> {
        if report.usage_page != KEY_USAGE_PAGE {
            return None;
        }
        if report.usage == ROLLOVER_SENTINEL {
            return None;
        }
        let device_key = report.device_key();
        if !self.selection_keys.contains(&device_key) {
            return None;
        }
        let key_code = KeyMapper::usage_to_key_code(report.usage)?;

        let cur = report.value > 0;
        let prev = self.prev_state.get(&key_code).copied().unwrap_or(false);
        let direction = match (prev, cur) {
            (false, true) => KeyDirection::Down,
            (true, false) => KeyDirection::Up,
            _ => return None,
        };
        self.prev_state.insert(key_code, cur);

        Some(Keystroke {
            key_code,
            direction,
            at: report.at,
            source_device_key: device_key,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::{Device, Transport};
    use std::time::Instant;

    fn selected_device() -> Device {
        Device::new(0x5ac, 0x24f, 0x14100012, Transport::Usb, "External", "Acme")
    }

    fn other_device() -> Device {
        Device::new(0x46d, 0xc31c, 0x00300000, Transport::Usb, "Other", "Logi")
    }

    fn report(device: &Device, usage: u32, value: i32) -> HidKeyValue {
        let location_id = u32::from_str_radix(
            device.device_key.rsplit(':').next().expect("key format"),
            16,
        )
        .expect("hex location");
        HidKeyValue {
            vendor_id: device.vendor_id,
            product_id: device.product_id,
            location_id,
            usage_page: KEY_USAGE_PAGE,
            usage,
            value,
            at: Instant::now(),
        }
    }

    fn stream() -> DeviceStream {
        DeviceStream::new(&Selection::new(vec![selected_device()]).expect("selection"))
    }

    #[test]
    fn test_press_then_release_emit_down_then_up() {
        // Arrange
        let mut s = stream();
        let dev = selected_device();

        // Act
        let down = s.accept(&report(&dev, 0x1A, 1));
        let up = s.accept(&report(&dev, 0x1A, 0));

        // Assert
        let down = down.expect("press must emit");
        assert_eq!(down.key_code, 13);
        assert_eq!(down.direction, KeyDirection::Down);
        assert_eq!(down.source_device_key, dev.device_key);

        let up = up.expect("release must emit");
        assert_eq!(up.direction, KeyDirection::Up);
    }

    #[test]
    fn test_repeated_state_reports_emit_nothing() {
        // A held key reports value 1 on every state report.
        let mut s = stream();
        let dev = selected_device();

        assert!(s.accept(&report(&dev, 0x07, 1)).is_some());
        assert!(s.accept(&report(&dev, 0x07, 1)).is_none());
        assert!(s.accept(&report(&dev, 0x07, 1)).is_none());
        assert!(s.accept(&report(&dev, 0x07, 0)).is_some());
        assert!(s.accept(&report(&dev, 0x07, 0)).is_none());
    }

    #[test]
    fn test_rollover_sentinel_is_dropped() {
        let mut s = stream();
        let dev = selected_device();

        assert!(s.accept(&report(&dev, ROLLOVER_SENTINEL, 1)).is_none());
    }

    #[test]
    fn test_unselected_device_is_dropped() {
        let mut s = stream();
        let other = other_device();

        assert!(s.accept(&report(&other, 0x1A, 1)).is_none());
    }

    #[test]
    fn test_non_keyboard_usage_page_is_dropped() {
        let mut s = stream();
        let dev = selected_device();
        let mut r = report(&dev, 0x1A, 1);
        r.usage_page = 0x0C; // consumer page (media keys)

        assert!(s.accept(&r).is_none());
    }

    #[test]
    fn test_unmapped_high_usage_is_dropped() {
        let mut s = stream();
        let dev = selected_device();

        assert!(s.accept(&report(&dev, 0x2FF, 1)).is_none());
    }

    #[test]
    fn test_release_without_prior_press_emits_nothing() {
        // First observation of a key already at zero is steady state.
        let mut s = stream();
        let dev = selected_device();

        assert!(s.accept(&report(&dev, 0x1A, 0)).is_none());
    }

    #[test]
    fn test_all_selected_interfaces_are_accepted() {
        // Both transports of one physical keyboard are in the selection.
        let usb = Device::new(0x5ac, 0x24f, 0x14100012, Transport::Usb, "Ext", "Acme");
        let bt = Device::new(0x5ac, 0x24f, 0x141000a0, Transport::Bluetooth, "Ext", "Acme");
        let mut s = DeviceStream::new(&Selection::new(vec![usb.clone(), bt.clone()]).expect("selection"));

        assert!(s.accept(&report(&usb, 0x04, 1)).is_some());
        assert!(s.accept(&report(&bt, 0x05, 1)).is_some());
    }
}
