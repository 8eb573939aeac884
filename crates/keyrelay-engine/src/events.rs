//! Engine domain events.
//!
//! The engine publishes these on an unbounded channel instead of exposing
//! mutable state for a UI to bind to.  Consumers (a shell, a log viewer)
//! render them however they like; nothing in the engine ever reads them
//! back.

use keyrelay_core::{KeyDirection, RelayDirection};
use uuid::Uuid;

use crate::application::session::SessionState;

/// One observable engine occurrence.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The device stream derived a keystroke from the selected keyboard.
    KeystrokeCaptured {
        key_code: i32,
        key_name: String,
        direction: KeyDirection,
        source_device_key: String,
    },
    /// The tap dropped a host event attributed to the selected keyboard.
    HostEventBlocked {
        key_code: i32,
        direction: KeyDirection,
    },
    /// The controller accepted a relayed key event.
    RelayCompleted {
        scan_code: i32,
        direction: RelayDirection,
        guest: Uuid,
    },
    /// The controller rejected a relayed key event; the event is lost.
    RelayFailed {
        scan_code: i32,
        direction: RelayDirection,
        guest: Uuid,
        error: String,
    },
    /// The session supervisor changed state.
    SessionStateChanged { state: SessionState },
    /// The selected keyboard disappeared mid-session.
    DeviceVanished { physical_id: String },
}
