//! Keyboard device identity.
//!
//! A physical keyboard often shows up in the HID registry as several
//! interfaces at once — a wired USB interface and a wireless receiver, for
//! example.  Interposing only one of them would let keystrokes leak through
//! the other, so identity is modelled at two levels:
//!
//! - [`Device::device_key`] identifies **one interface**: the full
//!   `vendor:product:location` tuple.
//! - [`Device::physical_id`] collapses all interfaces of **one physical
//!   keyboard** by discarding the low byte of the location (interfaces of
//!   the same unit differ only there).
//!
//! The built-in keyboard reports location zero (or a "built-in"/"spi"
//! transport string); that is the only signal separating it from an
//! external keyboard of the same vendor, so location zero always yields
//! [`Transport::BuiltIn`] and its own `physical_id`.

use serde::{Deserialize, Serialize};

/// Transport over which a HID interface is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transport {
    Usb,
    Bluetooth,
    BuiltIn,
    Unknown,
}

impl Transport {
    /// Classifies the transport string reported by the HID registry.
    ///
    /// `location_id == 0` forces [`Transport::BuiltIn`] regardless of the
    /// reported string; Apple's internal keyboards report either location
    /// zero or an "spi" transport depending on the model year.
    pub fn classify(reported: &str, location_id: u32) -> Self {
        if location_id == 0 {
            return Transport::BuiltIn;
        }
        let lower = reported.to_ascii_lowercase();
        match lower.as_str() {
            "usb" => Transport::Usb,
            "bluetooth" | "bluetooth low energy" => Transport::Bluetooth,
            "built-in" | "spi" => Transport::BuiltIn,
            _ => Transport::Unknown,
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Transport::Usb => "USB",
            Transport::Bluetooth => "Bluetooth",
            Transport::BuiltIn => "built-in",
            Transport::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One HID keyboard interface, as enumerated from the platform registry.
///
/// Immutable snapshot; records are rebuilt on every enumeration.  Two
/// records with equal [`Device::physical_id`] are interfaces of the same
/// physical keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Stable interface identity: `vendor:product:location`, lowercase hex,
    /// 4/4/8 digits.
    pub device_key: String,
    /// Physical-unit identity: `vendor-product-(location >> 8)`.
    pub physical_id: String,
    pub name: String,
    pub manufacturer: String,
    pub transport: Transport,
    pub vendor_id: u32,
    pub product_id: u32,
}

impl Device {
    /// Builds a device record, deriving both identity strings.
    pub fn new(
        vendor_id: u32,
        product_id: u32,
        location_id: u32,
        transport: Transport,
        name: impl Into<String>,
        manufacturer: impl Into<String>,
    ) -> Self {
        Self {
            device_key: Self::device_key_for(vendor_id, product_id, location_id),
            physical_id: Self::physical_id_for(vendor_id, product_id, location_id),
            name: name.into(),
            manufacturer: manufacturer.into(),
            transport,
            vendor_id,
            product_id,
        }
    }

    /// Derives the interface key for a `(vendor, product, location)` triple.
    pub fn device_key_for(vendor_id: u32, product_id: u32, location_id: u32) -> String {
        format!("{vendor_id:04x}:{product_id:04x}:{location_id:08x}")
    }

    /// Derives the physical-unit id for a `(vendor, product, location)` triple.
    ///
    /// Interfaces of one unit share the upper location bits; the shift keeps
    /// a location-zero built-in keyboard distinct from every external
    /// interface of the same vendor/product.
    pub fn physical_id_for(vendor_id: u32, product_id: u32, location_id: u32) -> String {
        format!("{vendor_id:04x}-{product_id:04x}-{:x}", location_id >> 8)
    }
}

/// Error type for selection construction.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    /// A selection must be interfaces of exactly one physical keyboard.
    #[error("selection mixes physical keyboards: {first} and {second}")]
    MixedPhysicalIds { first: String, second: String },
}

/// All enumerated interfaces of one physical keyboard.
///
/// Produced by identity detection and consumed by the session supervisor.
/// The correlator treats the set of `device_key`s as its match criterion so
/// that every interface of the selected keyboard is intercepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    devices: Vec<Device>,
}

impl Selection {
    /// Creates a selection from interface records.
    ///
    /// Rejects records spanning more than one physical keyboard, and
    /// deduplicates on `(physical_id, transport)`: the registry can report
    /// the same interface twice after a wake from sleep, but two interfaces
    /// with different transports are both kept.
    pub fn new(devices: Vec<Device>) -> Result<Self, SelectionError> {
        if let Some(first) = devices.first() {
            for other in &devices[1..] {
                if other.physical_id != first.physical_id {
                    return Err(SelectionError::MixedPhysicalIds {
                        first: first.physical_id.clone(),
                        second: other.physical_id.clone(),
                    });
                }
            }
        }
        let mut seen: Vec<(String, Transport)> = Vec::new();
        let mut deduped = Vec::new();
        for d in devices {
            let key = (d.physical_id.clone(), d.transport);
            if !seen.contains(&key) {
                seen.push(key);
                deduped.push(d);
            }
        }
        Ok(Self { devices: deduped })
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// The physical id shared by the selected interfaces.
    pub fn physical_id(&self) -> Option<&str> {
        self.devices.first().map(|d| d.physical_id.as_str())
    }

    /// Returns `true` if a reporting interface belongs to this selection.
    pub fn contains_device_key(&self, device_key: &str) -> bool {
        self.devices.iter().any(|d| d.device_key == device_key)
    }

    /// Display name of the selected keyboard (from its first interface).
    pub fn display_name(&self) -> &str {
        self.devices.first().map(|d| d.name.as_str()).unwrap_or("")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn external(vendor: u32, product: u32, location: u32, transport: Transport) -> Device {
        Device::new(vendor, product, location, transport, "kbd", "acme")
    }

    #[test]
    fn test_device_key_uses_fixed_width_lowercase_hex() {
        // Arrange / Act
        let d = external(0x5ac, 0x24f, 0x14100000, Transport::Usb);

        // Assert
        assert_eq!(d.device_key, "05ac:024f:14100000");
    }

    #[test]
    fn test_same_unit_interfaces_share_physical_id() {
        // Two interfaces of one keyboard: locations differ only in the low byte.
        let usb = external(0x5ac, 0x24f, 0x14100012, Transport::Usb);
        let bt = external(0x5ac, 0x24f, 0x141000a0, Transport::Bluetooth);

        assert_eq!(usb.physical_id, bt.physical_id);
        assert_ne!(usb.device_key, bt.device_key);
    }

    #[test]
    fn test_location_zero_is_never_merged_with_external_interface() {
        // Same vendor/product, one built-in (location 0), one external.
        let builtin = external(0x5ac, 0x24f, 0, Transport::BuiltIn);
        let ext = external(0x5ac, 0x24f, 0x14100000, Transport::Usb);

        assert_ne!(builtin.physical_id, ext.physical_id);
    }

    #[test]
    fn test_classify_location_zero_is_builtin_regardless_of_report() {
        assert_eq!(Transport::classify("USB", 0), Transport::BuiltIn);
        assert_eq!(Transport::classify("Bluetooth", 0), Transport::BuiltIn);
    }

    #[test]
    fn test_classify_transport_strings() {
        assert_eq!(Transport::classify("USB", 0x1410_0000), Transport::Usb);
        assert_eq!(Transport::classify("usb", 0x1410_0000), Transport::Usb);
        assert_eq!(
            Transport::classify("Bluetooth", 0x1410_0000),
            Transport::Bluetooth
        );
        assert_eq!(Transport::classify("SPI", 0x1410_0000), Transport::BuiltIn);
        assert_eq!(
            Transport::classify("Built-in", 0x1410_0000),
            Transport::BuiltIn
        );
        assert_eq!(
            Transport::classify("FireWire", 0x1410_0000),
            Transport::Unknown
        );
    }

    #[test]
    fn test_selection_keeps_both_transports_of_one_unit() {
        let usb = external(0x5ac, 0x24f, 0x14100012, Transport::Usb);
        let bt = external(0x5ac, 0x24f, 0x141000a0, Transport::Bluetooth);

        let sel = Selection::new(vec![usb.clone(), bt.clone()]).expect("one physical unit");

        assert_eq!(sel.devices().len(), 2);
        assert!(sel.contains_device_key(&usb.device_key));
        assert!(sel.contains_device_key(&bt.device_key));
    }

    #[test]
    fn test_selection_drops_duplicate_physical_id_and_transport() {
        // Registry double-report of the same interface after wake.
        let a = external(0x5ac, 0x24f, 0x14100012, Transport::Usb);
        let b = external(0x5ac, 0x24f, 0x14100013, Transport::Usb);

        let sel = Selection::new(vec![a.clone(), b]).expect("one physical unit");

        assert_eq!(sel.devices().len(), 1);
        assert_eq!(sel.devices()[0].device_key, a.device_key);
    }

    #[test]
    fn test_selection_rejects_mixed_physical_keyboards() {
        let a = external(0x5ac, 0x24f, 0x14100012, Transport::Usb);
        let b = external(0x46d, 0xc31c, 0x00300000, Transport::Usb);

        let result = Selection::new(vec![a, b]);

        assert!(matches!(
            result,
            Err(SelectionError::MixedPhysicalIds { .. })
        ));
    }

    #[test]
    fn test_selection_contains_rejects_unknown_interface() {
        let sel = Selection::new(vec![external(0x5ac, 0x24f, 0x14100012, Transport::Usb)])
            .expect("one physical unit");
        assert!(!sel.contains_device_key("046d:c31c:00300000"));
    }
}
