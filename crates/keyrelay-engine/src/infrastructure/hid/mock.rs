//! Mock HID source for unit and integration testing.
//!
//! Lets tests configure an enumeration snapshot and inject synthetic value
//! reports without a HID registry.

use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::time::Instant;

use keyrelay_core::Device;

use super::{HidError, HidKeyValue, HidSource, KEY_USAGE_PAGE};

/// A mock implementation of [`HidSource`] driven entirely by the test.
pub struct MockHidSource {
    devices: Mutex<Vec<Device>>,
    sender: Arc<Mutex<Option<Sender<HidKeyValue>>>>,
    enumerate_error: Mutex<Option<fn() -> HidError>>,
    start_error: Mutex<Option<fn() -> HidError>>,
}

impl MockHidSource {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
            sender: Arc::new(Mutex::new(None)),
            enumerate_error: Mutex::new(None),
            start_error: Mutex::new(None),
        }
    }

    /// Replaces the enumeration snapshot (simulates hot-plug).
    pub fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.lock().expect("lock poisoned") = devices;
    }

    /// Makes the next `enumerate` call fail with the given error.
    pub fn fail_enumerate_with(&self, make: fn() -> HidError) {
        *self.enumerate_error.lock().expect("lock poisoned") = Some(make);
    }

    /// Makes the next `start` call fail with the given error.
    pub fn fail_start_with(&self, make: fn() -> HidError) {
        *self.start_error.lock().expect("lock poisoned") = Some(make);
    }

    /// Injects a raw value report, as if delivered by the registry callback.
    ///
    /// Panics if `start()` has not been called or `stop()` already ran.
    pub fn inject(&self, value: HidKeyValue) {
        let guard = self.sender.lock().expect("lock poisoned");
        let sender = guard
            .as_ref()
            .expect("MockHidSource::inject called before start()");
        sender
            .send(value)
            .expect("receiver dropped; listener no longer running");
    }

    /// Convenience: injects a keyboard-page report for `device` at `at`.
    pub fn inject_key(&self, device: &Device, usage: u32, value: i32, at: Instant) {
        // Recover the location from the device key; the mock keeps the
        // identity triple consistent the way the registry would.
        let location_id = device
            .device_key
            .rsplit(':')
            .next()
            .and_then(|s| u32::from_str_radix(s, 16).ok())
            .unwrap_or(0);
        self.inject(HidKeyValue {
            vendor_id: device.vendor_id,
            product_id: device.product_id,
            location_id,
            usage_page: KEY_USAGE_PAGE,
            usage,
            value,
            at,
        });
    }

    /// `true` while a listener holds the channel open.
    pub fn listening(&self) -> bool {
        self.sender.lock().expect("lock poisoned").is_some()
    }
}

impl HidSource for MockHidSource {
    fn enumerate(&self) -> Result<Vec<Device>, HidError> {
        if let Some(make) = self.enumerate_error.lock().expect("lock poisoned").take() {
            return Err(make());
        }
        Ok(self.devices.lock().expect("lock poisoned").clone())
    }

    fn start(&self) -> Result<mpsc::Receiver<HidKeyValue>, HidError> {
        if let Some(make) = self.start_error.lock().expect("lock poisoned").take() {
            return Err(make());
        }
        let mut guard = self.sender.lock().expect("lock poisoned");
        if guard.is_some() {
            return Err(HidError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel();
        *guard = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        // Drop the sender to close the channel.
        *self.sender.lock().expect("lock poisoned") = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::Transport;

    fn sample_device() -> Device {
        Device::new(0x5ac, 0x24f, 0x14100012, Transport::Usb, "Test Keyboard", "Acme")
    }

    #[test]
    fn test_mock_delivers_injected_reports() {
        // Arrange
        let device = sample_device();
        let source = MockHidSource::new(vec![device.clone()]);
        let rx = source.start().expect("start should succeed");

        // Act
        source.inject_key(&device, 0x1A, 1, Instant::now());

        // Assert
        let report = rx.recv().expect("should receive report");
        assert_eq!(report.usage, 0x1A);
        assert_eq!(report.value, 1);
        assert_eq!(report.device_key(), device.device_key);
    }

    #[test]
    fn test_mock_stop_closes_channel() {
        let source = MockHidSource::new(vec![]);
        let rx = source.start().expect("start should succeed");

        source.stop();

        assert!(rx.recv().is_err(), "channel must close after stop()");
        assert!(!source.listening());
    }

    #[test]
    fn test_mock_rejects_double_start() {
        let source = MockHidSource::new(vec![]);
        let _rx = source.start().expect("first start succeeds");

        let second = source.start();
        assert!(matches!(second, Err(HidError::AlreadyStarted)));
    }

    #[test]
    fn test_mock_can_restart_after_stop() {
        let source = MockHidSource::new(vec![]);
        let _rx = source.start().expect("first start");
        source.stop();

        assert!(source.start().is_ok(), "restart after stop must work");
    }

    #[test]
    fn test_mock_injected_enumerate_error_fires_once() {
        let source = MockHidSource::new(vec![sample_device()]);
        source.fail_enumerate_with(|| HidError::PermissionDenied);

        assert!(matches!(source.enumerate(), Err(HidError::PermissionDenied)));
        // Subsequent call succeeds again.
        assert_eq!(source.enumerate().expect("snapshot").len(), 1);
    }
}
