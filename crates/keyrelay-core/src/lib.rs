//! # keyrelay-core
//!
//! Shared library for KeyRelay containing the device identity model, the
//! keystroke event types, and the key code translation tables.
//!
//! This crate is used by the engine and by anything that wants to reason
//! about devices or key codes without pulling in OS APIs.  It has zero
//! dependencies on HID subsystems, event taps, or subprocess plumbing.
//!
//! - **`domain`** – Pure records: `Device` (one HID interface of a physical
//!   keyboard, with its stable `device_key` and transport-collapsing
//!   `physical_id`), `Selection` (all interfaces of one physical keyboard),
//!   and the keystroke/host-event/relay-intent value types.
//!
//! - **`keymap`** – The three translation tables on the per-keystroke hot
//!   path: HID usage → internal key code, key code → human-readable name,
//!   and key code → guest scan code (physical-QWERTY position).

pub mod domain;
pub mod keymap;

pub use domain::device::{Device, Selection, SelectionError, Transport};
pub use domain::events::{HostEvent, KeyDirection, Keystroke, RelayDirection, RelayIntent};
pub use keymap::{KeyMapper, ROLLOVER_SENTINEL};
