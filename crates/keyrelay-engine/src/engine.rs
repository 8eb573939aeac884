//! The operator-facing engine facade.
//!
//! Owns the configuration and the collaborator handles, and wires them
//! into the session supervisor.  Everything is an owned value passed down
//! explicitly — there are no process-wide singletons, so tests can run
//! several engines side by side with mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use keyrelay_core::{Device, Keystroke, Selection};
use tokio::sync::mpsc;

use crate::application::correlator::CorrelatorTuning;
use crate::application::detect_identity::{
    correlate_evidence, observe_presses, DetectError, StopPredicate,
};
use crate::application::session::{
    SessionHandle, SessionMode, SessionStatus, SessionSupervisor, SupervisorConfig,
};
use crate::events::EngineEvent;
use crate::infrastructure::guest::{Guest, GuestController, RelayError};
use crate::infrastructure::hid::{HidError, HidSource};
use crate::infrastructure::host_tap::HostTap;
use crate::infrastructure::storage::config::EngineConfig;

/// The keyboard interposer engine.
pub struct Engine {
    hid: Arc<dyn HidSource>,
    controller: Arc<dyn GuestController>,
    supervisor: SessionSupervisor,
    events_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
}

impl Engine {
    /// Builds an engine from explicit collaborators.
    pub fn new(
        config: &EngineConfig,
        hid: Arc<dyn HidSource>,
        tap: Arc<dyn HostTap>,
        controller: Arc<dyn GuestController>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor_config = SupervisorConfig {
            tuning: CorrelatorTuning {
                initial_window: config.timing.initial_window(),
                hold_ttl: config.timing.hold_ttl(),
                entry_ttl: config.timing.entry_ttl(),
                map_cap: config.timing.correlation_map_cap,
            },
            janitor_period: config.timing.janitor_period(),
            ..SupervisorConfig::default()
        };
        let supervisor = SessionSupervisor::new(
            Arc::clone(&hid),
            tap,
            Arc::clone(&controller),
            events_tx,
            supervisor_config,
        );
        Self {
            hid,
            controller,
            supervisor,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
        }
    }

    /// Builds an engine on the platform HID registry, event tap, and
    /// configured controller executable.
    #[cfg(target_os = "macos")]
    pub fn with_platform_sources(config: &EngineConfig) -> Self {
        use crate::infrastructure::guest::cli::CliGuestController;
        use crate::infrastructure::hid::macos::MacosHidSource;
        use crate::infrastructure::host_tap::macos::MacosHostTap;

        Self::new(
            config,
            Arc::new(MacosHidSource::new()),
            Arc::new(MacosHostTap::new()),
            Arc::new(CliGuestController::new(config.controller.path.clone())),
        )
    }

    /// Fresh snapshot of attached keyboard interfaces.
    pub fn enumerate_devices(&self) -> Result<Vec<Device>, HidError> {
        self.hid.enumerate()
    }

    /// Runs identity detection until `stop` fires.
    ///
    /// On `NoMatch` the enumeration is refreshed once and the same
    /// evidence re-correlated — the usual cause is a snapshot that went
    /// stale between enumeration and detection.
    pub fn detect_identity(&self, stop: StopPredicate) -> Result<Selection, DetectError> {
        let available = self.hid.enumerate()?;
        let evidence = observe_presses(self.hid.as_ref(), stop)?;
        match correlate_evidence(&evidence, &available) {
            Ok(selection) => Ok(selection),
            Err(DetectError::NoMatch) => {
                let refreshed = self.hid.enumerate()?;
                correlate_evidence(&evidence, &refreshed)
            }
            Err(e) => Err(e),
        }
    }

    /// Starts a session against `selection`.
    pub fn start_session(
        &self,
        selection: Selection,
        mode: SessionMode,
        duration: Option<Duration>,
    ) -> Result<SessionHandle, crate::application::session::SessionError> {
        self.supervisor.start_session(selection, mode, duration)
    }

    /// Operator stop.
    pub fn stop_session(&self, handle: &SessionHandle) {
        self.supervisor.stop_session(handle);
    }

    /// Read-only status snapshot of a session.
    pub fn session_status(&self, handle: &SessionHandle) -> SessionStatus {
        handle.status()
    }

    /// Clones the session's keystroke log.
    pub fn copy_keystroke_log(&self, handle: &SessionHandle) -> Vec<Keystroke> {
        handle.keystroke_log()
    }

    /// Lists guests known to the hypervisor controller.
    pub async fn list_guests(&self) -> Result<Vec<Guest>, RelayError> {
        self.controller.list_guests().await
    }

    /// Takes the engine event receiver.  Single consumer; returns `None`
    /// after the first call.
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}
