//! Infrastructure layer: OS-facing services behind testable traits.

pub mod guest;
pub mod hid;
pub mod host_tap;
pub mod storage;

#[cfg(target_os = "macos")]
mod macos_ffi;
