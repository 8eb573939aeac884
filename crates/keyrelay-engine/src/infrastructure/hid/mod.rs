//! HID input infrastructure.
//!
//! On macOS this opens an IOHIDManager matched to the generic-desktop
//! keyboard and keypad usages, enumerates the matching interfaces, and
//! delivers per-element value reports from a dedicated run-loop thread.
//! Raw reports are placed into an `mpsc` channel and consumed by the
//! identity detector (during detection) or the device stream (during a
//! session).
//!
//! # Testability
//!
//! The [`HidSource`] trait allows unit tests to inject synthetic reports
//! without a HID registry; the production implementation is compiled only
//! on macOS.

use std::sync::mpsc;
use std::time::Instant;

use keyrelay_core::Device;

pub mod mock;

#[cfg(target_os = "macos")]
pub mod macos;

/// Generic desktop usage page, used for device matching.
pub const GENERIC_DESKTOP_PAGE: u32 = 0x01;
/// Keyboard usage on the generic desktop page.
pub const USAGE_KEYBOARD: u32 = 0x06;
/// Keypad usage on the generic desktop page.
pub const USAGE_KEYPAD: u32 = 0x07;
/// Keyboard/keypad usage page carried by key elements in value reports.
pub const KEY_USAGE_PAGE: u32 = 0x07;

/// One raw HID element value report.
///
/// Carries the reporting interface's identity triple so consumers can
/// derive `device_key` / `physical_id` without a registry lookup: a shared
/// manager callback may deliver values for any matched interface, not just
/// the one a session selected.
#[derive(Debug, Clone)]
pub struct HidKeyValue {
    pub vendor_id: u32,
    pub product_id: u32,
    pub location_id: u32,
    pub usage_page: u32,
    pub usage: u32,
    pub value: i32,
    pub at: Instant,
}

impl HidKeyValue {
    /// `device_key` of the reporting interface.
    pub fn device_key(&self) -> String {
        Device::device_key_for(self.vendor_id, self.product_id, self.location_id)
    }

    /// `physical_id` of the reporting interface.
    pub fn physical_id(&self) -> String {
        Device::physical_id_for(self.vendor_id, self.product_id, self.location_id)
    }
}

/// Error type for HID registry operations.
#[derive(Debug, thiserror::Error)]
pub enum HidError {
    /// The registry refused to open without an input-monitoring grant.
    /// Recoverable: surface to the operator, never retried automatically.
    #[error("input monitoring permission denied for the HID registry")]
    PermissionDenied,
    /// The platform HID service is absent or failed. Fatal to the session.
    #[error("HID subsystem unavailable: {0}")]
    SubsystemUnavailable(String),
    /// `start` was called while a listener is already running.
    #[error("HID listener already running")]
    AlreadyStarted,
    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),
}

/// Trait abstracting the platform HID registry.
///
/// The production implementation wraps IOHIDManager; tests use
/// [`mock::MockHidSource`].
pub trait HidSource: Send + Sync {
    /// Enumerates attached keyboard/keypad interfaces.
    ///
    /// Omits handles whose usage is neither keyboard nor keypad. Each call
    /// returns a fresh snapshot; records are never cached across hot-plug.
    fn enumerate(&self) -> Result<Vec<Device>, HidError>;

    /// Starts value-report delivery across all matched keyboards and
    /// returns the receiving end of the report channel.
    fn start(&self) -> Result<mpsc::Receiver<HidKeyValue>, HidError>;

    /// Stops delivery and closes the report channel.
    fn stop(&self);
}
