//! # keyrelay-engine
//!
//! The keyboard interposer engine.  In real time it:
//!
//! 1. enumerates attached HID keyboards and groups them by physical
//!    identity,
//! 2. identifies which physical keyboard the user is typing on,
//! 3. consumes the device-specific HID stream and the system-wide host
//!    event stream concurrently,
//! 4. correlates the two so that only events originating from the selected
//!    keyboard are suppressed from the host, and
//! 5. translates and forwards those events to a VM guest via the
//!    hypervisor controller CLI, with correct press/release and held-key
//!    semantics.
//!
//! The crate splits into an **application** layer (identity detection,
//! transition filtering, correlation, session supervision — no OS calls)
//! and an **infrastructure** layer (HID registry, event tap, controller
//! subprocess, config persistence) behind traits with mock
//! implementations, so the whole engine is testable off-platform.

pub mod application;
pub mod engine;
pub mod events;
pub mod infrastructure;

pub use application::correlator::{Correlator, CorrelatorTuning, Decision};
pub use application::detect_identity::{stop_after_presses, DetectError, StopPredicate};
pub use application::session::{
    DegradedMode, SessionError, SessionHandle, SessionMode, SessionState, SessionStatus,
};
pub use engine::Engine;
pub use events::EngineEvent;
pub use infrastructure::guest::{Guest, GuestStatus, RelayError};
pub use infrastructure::hid::{HidError, HidKeyValue, HidSource};
pub use infrastructure::host_tap::{HostTap, TapDecision, TapError};
pub use infrastructure::storage::config::{load_config, EngineConfig};
