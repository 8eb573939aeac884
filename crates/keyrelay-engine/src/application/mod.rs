//! Application layer: the engine's decision logic, independent of OS APIs.

pub mod correlator;
pub mod detect_identity;
pub mod device_stream;
pub mod forward_relay;
pub mod session;
